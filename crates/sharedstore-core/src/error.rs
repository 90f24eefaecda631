//! Error types for sharedstore core.

use thiserror::Error;

/// Core errors: identity validation and value encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
