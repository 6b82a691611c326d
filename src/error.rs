//! Error types for the fit runner

use crate::fixture::ExecutionError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fit runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the fit runner
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding error on {path}: {message}")]
    Encoding { path: PathBuf, message: String },

    #[error("Failed to execute {path}: {source}")]
    Execution {
        path: PathBuf,
        #[source]
        source: ExecutionError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid include pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    /// Attach a path to a raw IO error
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }
}
