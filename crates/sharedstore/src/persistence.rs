//! The persistence capability as seen by stores.

use std::fmt;
use std::sync::Arc;

use sharedstore_persist::{AsyncPersistence, SyncPersistence};

/// A persistence backend, tagged by its shape.
///
/// Stores match on this once per operation: synchronous backends are written
/// inline, asynchronous ones on a spawned task whose resolution is guarded
/// against newer writes.
#[derive(Clone)]
pub enum Persistence {
    Sync(Arc<dyn SyncPersistence>),
    Async(Arc<dyn AsyncPersistence>),
}

impl Persistence {
    pub fn sync<P: SyncPersistence + 'static>(backend: P) -> Self {
        Persistence::Sync(Arc::new(backend))
    }

    pub fn asynchronous<P: AsyncPersistence + 'static>(backend: P) -> Self {
        Persistence::Async(Arc::new(backend))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Persistence::Async(_))
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Sync(_) => f.write_str("Persistence::Sync"),
            Persistence::Async(_) => f.write_str("Persistence::Async"),
        }
    }
}
