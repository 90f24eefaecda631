//! Asynchronous adapter over a synchronous backend.
//!
//! Every call runs on tokio's blocking pool via `spawn_blocking`, so a slow
//! disk never stalls the async runtime. `set` reads the entry back and
//! resolves to what the backend actually holds.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PersistError, Result};
use crate::traits::{AsyncPersistence, SyncPersistence};

/// Async-resolving wrapper around any [`SyncPersistence`].
pub struct Blocking<P> {
    inner: Arc<P>,
}

impl<P: SyncPersistence + 'static> Blocking<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Wrap a backend that is also used synchronously elsewhere.
    pub fn from_arc(inner: Arc<P>) -> Self {
        Self { inner }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: SyncPersistence + 'static> AsyncPersistence for Blocking<P> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        run_blocking(move || inner.get(&key)).await
    }

    async fn set(&self, key: &str, value: String) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        run_blocking(move || {
            inner.set(&key, &value)?;
            Ok(inner.get(&key)?.unwrap_or(value))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        run_blocking(move || inner.remove(&key)).await
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PersistError::Task(format!("spawn_blocking failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPersistence;
    use crate::sqlite::SqlitePersistence;

    #[tokio::test]
    async fn test_blocking_memory_round_trip() {
        let backend = Blocking::new(MemoryPersistence::new());

        assert_eq!(backend.get("k").await.unwrap(), None);
        let stored = backend.set("k", "\"hello\"".to_string()).await.unwrap();
        assert_eq!(stored, "\"hello\"");
        assert_eq!(backend.inner().get("k").unwrap().as_deref(), Some("\"hello\""));

        backend.remove("k").await.unwrap();
        assert!(backend.inner().is_empty());
    }

    #[tokio::test]
    async fn test_blocking_quota_and_sqlite() {
        let backend = Blocking::new(MemoryPersistence::with_capacity(2));
        let err = backend.set("key", "value".to_string()).await.unwrap_err();
        assert!(matches!(err, PersistError::QuotaExceeded { .. }));

        let sqlite = Blocking::new(SqlitePersistence::open_memory().unwrap());
        assert_eq!(sqlite.set("k", "1".to_string()).await.unwrap(), "1");
        assert_eq!(sqlite.get("k").await.unwrap().as_deref(), Some("1"));
    }
}
