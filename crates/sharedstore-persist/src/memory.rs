//! In-memory implementation of the persistence traits.
//!
//! Same semantics as the SQLite backend but nothing survives the process.
//! An optional byte capacity makes it behave like a quota-limited host store,
//! which is how write failures are exercised in tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{PersistError, Result};
use crate::traits::SyncPersistence;

/// In-memory key-value persistence. Thread-safe via RwLock.
pub struct MemoryPersistence {
    inner: RwLock<MemoryInner>,
    /// Maximum bytes (keys plus values) the backend accepts.
    capacity: Option<usize>,
}

struct MemoryInner {
    entries: HashMap<String, String>,
    used: usize,
}

impl MemoryPersistence {
    /// Create an empty, unbounded backend.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                entries: HashMap::new(),
                used: 0,
            }),
            capacity: None,
        }
    }

    /// Create an empty backend that rejects writes beyond `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).used
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = inner.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPersistence for MemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let previous = inner
            .entries
            .get(key)
            .map(|v| key.len() + v.len())
            .unwrap_or(0);
        let needed = inner.used - previous + key.len() + value.len();

        if let Some(capacity) = self.capacity {
            if needed > capacity {
                return Err(PersistError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    capacity,
                });
            }
        }

        inner.entries.insert(key.to_string(), value.to_string());
        inner.used = needed;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = inner.entries.remove(key) {
            inner.used -= key.len() + value.len();
        }
        Ok(())
    }
}
