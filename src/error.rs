//! Error types for the album library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, persisting or refreshing the library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache format: {0}")]
    Format(String),

    #[error("Duplicate album name: {0}")]
    DuplicateAlbumName(String),

    #[error("No albums found in any library directory")]
    EmptyLibrary,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LibraryError {
    /// Wrap an IO error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
