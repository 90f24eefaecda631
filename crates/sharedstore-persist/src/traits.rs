//! Persistence traits: the capability interface stores write through.
//!
//! Hosts offer durable key-value storage in one of two shapes. A synchronous
//! backend answers immediately and reports failures (such as a full quota)
//! as errors. An asynchronous backend resolves later and, on a successful
//! write, hands back the value it actually stored. Stores branch on this
//! shape once, never on backend identity.

use async_trait::async_trait;

use crate::error::Result;

/// Synchronous key-value persistence.
///
/// Keys and values are opaque strings; stores pass `prefix + namespace` keys
/// and JSON-encoded values.
pub trait SyncPersistence: Send + Sync {
    /// Read the entry under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the entry under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Asynchronous key-value persistence.
///
/// # Design Notes
///
/// - `set` resolves to the canonical stored value. Backends that normalise
///   what they store return the normalised form; stores adopt it.
/// - No timeouts are imposed here. A backend that never resolves stalls the
///   write silently.
#[async_trait]
pub trait AsyncPersistence: Send + Sync {
    /// Read the entry under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key` and resolve to the stored value.
    async fn set(&self, key: &str, value: String) -> Result<String>;

    /// Remove the entry under `key`.
    async fn remove(&self, key: &str) -> Result<()>;
}
