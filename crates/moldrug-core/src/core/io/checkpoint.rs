//! zstd-compressed TOML documents.
//!
//! Used for genetic-algorithm checkpoints and for the reports written when a
//! docking run fails. TOML keeps `inf` costs intact across a save/load cycle.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File extension of every compressed document written by this module.
pub const EXTENSION: &str = "toml.zst";

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to decompress '{path}': {source}")]
    Decompress {
        path: String,
        source: std::io::Error,
    },
    #[error("'{path}' is not valid UTF-8")]
    Utf8 { path: String },
    #[error("TOML serialization error for '{path}': {source}")]
    Serialize {
        path: String,
        source: toml::ser::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// Serializes `value` to TOML and writes it zstd-compressed to `path`.
///
/// Parent directories are created when missing; an existing file is replaced.
pub fn save<T: Serialize>(value: &T, path: &Path) -> Result<(), CheckpointError> {
    let display = path.to_string_lossy().to_string();
    let text = toml::to_string(value).map_err(|e| CheckpointError::Serialize {
        path: display.clone(),
        source: e,
    })?;
    let compressed =
        zstd::stream::encode_all(text.as_bytes(), COMPRESSION_LEVEL).map_err(|e| {
            CheckpointError::Io {
                path: display.clone(),
                source: e,
            }
        })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CheckpointError::Io {
            path: parent.to_string_lossy().to_string(),
            source: e,
        })?;
    }
    fs::write(path, compressed).map_err(|e| CheckpointError::Io {
        path: display,
        source: e,
    })
}

/// Reads a document written by [`save`].
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    let display = path.to_string_lossy().to_string();
    let bytes = fs::read(path).map_err(|e| CheckpointError::Io {
        path: display.clone(),
        source: e,
    })?;
    let raw = zstd::stream::decode_all(bytes.as_slice()).map_err(|e| {
        CheckpointError::Decompress {
            path: display.clone(),
            source: e,
        }
    })?;
    let text = String::from_utf8(raw).map_err(|_| CheckpointError::Utf8 {
        path: display.clone(),
    })?;
    toml::from_str(&text).map_err(|e| CheckpointError::Toml {
        path: display,
        source: e,
    })
}
