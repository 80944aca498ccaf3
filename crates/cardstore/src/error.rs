use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// High-level error type shared across the card store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not a project: {}", .0.display())]
    NotAProject(PathBuf),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("schema '{schema}' violated: {}", .violations.join("; "))]
    SchemaViolation {
        schema: String,
        violations: Vec<String>,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("all operations failed: {}", .0.join("; "))]
    Aggregate(Vec<String>),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl StoreError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            StoreError::NotFound(msg) => StoreError::NotFound(format!("{ctx}: {msg}")),
            StoreError::AlreadyExists(msg) => StoreError::AlreadyExists(format!("{ctx}: {msg}")),
            StoreError::InvalidInput(msg) => StoreError::InvalidInput(format!("{ctx}: {msg}")),
            StoreError::Forbidden(msg) => StoreError::Forbidden(format!("{ctx}: {msg}")),
            StoreError::Integrity(msg) => StoreError::Integrity(format!("{ctx}: {msg}")),
            StoreError::Serialization(msg) => StoreError::Serialization(format!("{ctx}: {msg}")),
            StoreError::Unexpected(msg) => StoreError::Unexpected(format!("{ctx}: {msg}")),
            StoreError::Io(err) => {
                StoreError::Io(std::io::Error::new(err.kind(), format!("{ctx}: {err}")))
            }
            other => other,
        }
    }

    /// Wraps an I/O failure on `path` so the surfaced message names the file.
    pub fn io_at(err: std::io::Error, path: &std::path::Path) -> Self {
        StoreError::Io(err).context(path.display())
    }
}
