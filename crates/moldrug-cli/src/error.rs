use moldrug::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A workflow error, tagged with the stage that raised it.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: EngineError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot parse '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn in_stage(stage: &str) -> impl FnOnce(EngineError) -> Self + '_ {
        move |source| Self::Stage {
            stage: stage.to_string(),
            source,
        }
    }
}
