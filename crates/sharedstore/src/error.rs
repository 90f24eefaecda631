//! Error types for stores and the registry.

use sharedstore_core::CoreError;
use thiserror::Error;

/// Errors surfaced to callers of the registry and stores.
///
/// Adapter failures during state transitions are never returned through
/// this type; they are logged or captured in [`Store::last_error`].
///
/// [`Store::last_error`]: crate::Store::last_error
#[derive(Debug, Error)]
pub enum StoreError {
    /// The namespace is not a usable identifier.
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },

    /// No store exists for the namespace.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// The namespace holds a store of a different value type.
    #[error("store {namespace} holds {existing}, requested {requested}")]
    TypeMismatch {
        namespace: String,
        existing: &'static str,
        requested: &'static str,
    },

    /// Value encoding error.
    #[error("core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidNamespace { namespace, reason } => {
                StoreError::InvalidNamespace { namespace, reason }
            }
            other => StoreError::Core(other),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_namespace_lifted_from_core() {
        let err: StoreError = CoreError::InvalidNamespace {
            namespace: " ".into(),
            reason: "blank",
        }
        .into();
        assert!(matches!(err, StoreError::InvalidNamespace { reason: "blank", .. }));

        let err: StoreError = CoreError::MalformedEnvelope("missing instanceId".into()).into();
        assert!(matches!(err, StoreError::Core(CoreError::MalformedEnvelope(_))));
    }
}
