// crates/devdash-server/src/error.rs
// Standardized error types for devdash

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the devdash library
#[derive(Error, Debug)]
pub enum DevdashError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("task cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using DevdashError
pub type Result<T> = std::result::Result<T, DevdashError>;

impl From<String> for DevdashError {
    fn from(s: String) -> Self {
        DevdashError::Other(s)
    }
}

impl From<tokio::task::JoinError> for DevdashError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            DevdashError::Cancelled
        } else {
            DevdashError::Other(err.to_string())
        }
    }
}

impl From<DevdashError> for String {
    fn from(err: DevdashError) -> Self {
        err.to_string()
    }
}

/// Run-level failure of a refresh.
///
/// Cloned to every caller that joined the same in-flight run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("scan root unusable: {message}")]
    ScanRoot { message: String },

    #[error("persistence failed after {partial_count} projects: {message}")]
    Persistence {
        message: String,
        partial_count: usize,
    },

    #[error("refresh aborted: {message}")]
    Aborted { message: String },
}

impl RefreshError {
    /// Projects durably written before the run failed
    pub fn partial_count(&self) -> Option<usize> {
        match self {
            RefreshError::Persistence { partial_count, .. } => Some(*partial_count),
            _ => None,
        }
    }
}

/// Per-project extraction failure. Recovered inside the pipeline.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    #[error("project root unreadable: {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("extractor panicked: {0}")]
    Panicked(String),
}
