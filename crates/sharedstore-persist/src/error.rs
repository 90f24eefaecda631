//! Error types for the persistence module.

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Value could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend has no room for the entry.
    #[error("quota exceeded writing {key}: need {needed} bytes, capacity {capacity}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        capacity: usize,
    },

    /// The backend cannot be reached right now.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking task running the operation failed.
    #[error("persistence task failed: {0}")]
    Task(String),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;
