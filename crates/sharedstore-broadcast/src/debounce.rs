//! Trailing-edge debounce.
//!
//! [`Debounce`] coalesces a burst of calls into a single invocation of its
//! sink with the most recent item, fired once `interval` has passed without a
//! new call. Each call bumps a generation counter and arms a timer task; a
//! timer only fires if its generation is still current when it wakes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{BroadcastError, Result};

/// Reference quiescence window for coalescing inbound broadcast bursts.
pub const DEFAULT_COALESCE_INTERVAL: Duration = Duration::from_millis(300);

type Sink<T> = Box<dyn Fn(T) + Send + Sync>;

/// A trailing-edge debouncer delivering the latest item to a sink.
pub struct Debounce<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    interval: Duration,
    handle: Handle,
    pending: Mutex<Pending<T>>,
    sink: Sink<T>,
}

struct Pending<T> {
    generation: u64,
    latest: Option<T>,
}

impl<T: Send + 'static> Debounce<T> {
    /// Create a debouncer on the current tokio runtime.
    pub fn new<F>(interval: Duration, sink: F) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let handle = Handle::try_current().map_err(|_| BroadcastError::NoRuntime)?;
        Ok(Self::with_handle(handle, interval, sink))
    }

    /// Create a debouncer whose timers run on `handle`.
    pub fn with_handle<F>(handle: Handle, interval: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                interval,
                handle,
                pending: Mutex::new(Pending {
                    generation: 0,
                    latest: None,
                }),
                sink: Box::new(sink),
            }),
        }
    }

    /// Record `item` as the latest and restart the quiescence timer.
    pub fn call(&self, item: T) {
        let generation = {
            let mut pending = self.shared.lock();
            pending.generation += 1;
            pending.latest = Some(item);
            pending.generation
        };

        let shared = Arc::clone(&self.shared);
        self.shared.handle.spawn(async move {
            tokio::time::sleep(shared.interval).await;

            let item = {
                let mut pending = shared.lock();
                if pending.generation != generation {
                    return;
                }
                pending.latest.take()
            };

            if let Some(item) = item {
                (shared.sink)(item);
            }
        });
    }

    /// Deliver the pending item now, if any. Returns whether one was delivered.
    pub fn flush(&self) -> bool {
        let item = {
            let mut pending = self.shared.lock();
            pending.generation += 1;
            pending.latest.take()
        };

        match item {
            Some(item) => {
                (self.shared.sink)(item);
                true
            }
            None => false,
        }
    }

    /// Drop the pending item without delivering it.
    pub fn cancel(&self) {
        let mut pending = self.shared.lock();
        pending.generation += 1;
        pending.latest = None;
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().latest.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
