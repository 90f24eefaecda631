//! Error types for the broadcast module.

use thiserror::Error;

/// Errors that can occur during broadcast operations.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// No tokio runtime is available to drive delivery.
    #[error("no async runtime available for broadcast delivery")]
    NoRuntime,

    /// The channel was closed before the operation.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for broadcast operations.
pub type Result<T> = std::result::Result<T, BroadcastError>;
