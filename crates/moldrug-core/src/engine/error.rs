use thiserror::Error;

use super::config::ConfigError;
use super::docking::DockingError;
use crate::core::chem::ToolkitError;
use crate::core::desirability::DesirabilityError;
use crate::core::io::checkpoint::CheckpointError;
use crate::core::io::table::TableError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid desirability: {0}")]
    Desirability(#[from] DesirabilityError),

    #[error("Chemistry toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),

    #[error("Docking failed: {0}")]
    Docking(#[from] DockingError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Table export error: {0}")]
    Table(#[from] TableError),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Evaluation of individual {idx} ({smiles}) failed: {reason}")]
    Evaluation {
        idx: usize,
        smiles: String,
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}
