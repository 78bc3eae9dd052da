//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by snapshot reads and the collaborator traits.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tracker data in {path} line {line}: {message}")]
    MalformedJson {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl CoreError {
    /// Classify an io::Error against a path, mapping the common kinds.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied { path },
            _ => CoreError::Io { path, source },
        }
    }

    /// Whether a retry with a short delay could plausibly succeed.
    ///
    /// True for the busy/locked/interrupted family; false for not-found,
    /// permission, and malformed-data errors.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ResourceBusy
            ),
            _ => false,
        }
    }
}
