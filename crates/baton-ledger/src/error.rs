//! Error types for baton-ledger

use thiserror::Error;

/// Errors that can occur while reading or writing a task ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem failure while creating, appending to, or reading the ledger
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be encoded as a JSON line
    #[error("ledger serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task id cannot be used as a storage key
    #[error("invalid task id {task_id:?}: {reason}")]
    InvalidTaskId { task_id: String, reason: String },
}

impl LedgerError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
