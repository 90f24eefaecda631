//! Test doubles for the persistence and broadcast capabilities.
//!
//! Common setup code for unit and integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use sharedstore_broadcast::{BroadcastError, Broadcaster, Channel, Listener};
use sharedstore_persist::{
    AsyncPersistence, MemoryPersistence, PersistError, Result as PersistResult, SyncPersistence,
};

/// One call observed by a [`ProbePersistence`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCall {
    Get(String),
    Set(String, String),
    Remove(String),
}

/// Synchronous backend that records every call and fails on demand.
///
/// Backed by a [`MemoryPersistence`]; failed writes leave it untouched.
#[derive(Default)]
pub struct ProbePersistence {
    inner: MemoryPersistence,
    calls: Mutex<Vec<PersistCall>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl ProbePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entry without recording a call.
    pub fn seed(&self, key: &str, value: &str) {
        let _ = self.inner.set(key, value);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<PersistCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the writes so far, as `(key, value)` pairs.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PersistCall::Set(key, value) => Some((key, value)),
                _ => None,
            })
            .collect()
    }

    /// Current stored entry, read without recording a call.
    pub fn stored(&self, key: &str) -> Option<String> {
        self.inner.get(key).ok().flatten()
    }

    fn record(&self, call: PersistCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SyncPersistence for ProbePersistence {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        self.record(PersistCall::Get(key.to_string()));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("injected read failure".into()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        self.record(PersistCall::Set(key.to_string(), value.to_string()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("injected write failure".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        self.record(PersistCall::Remove(key.to_string()));
        self.inner.remove(key)
    }
}

/// How a [`GatedPersistence`] write should resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Store the written value and resolve to it.
    Commit,
    /// Store and resolve to a different canonical value.
    CommitAs(String),
    /// Reject the write.
    Reject(String),
}

struct PendingWrite {
    key: String,
    value: String,
    resolve: oneshot::Sender<WriteOutcome>,
}

/// Asynchronous backend whose writes stay in flight until the test resolves
/// them, in any order.
#[derive(Default)]
pub struct GatedPersistence {
    inner: MemoryPersistence,
    pending: Mutex<VecDeque<PendingWrite>>,
    arrived: Notify,
}

impl GatedPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entry.
    pub fn seed(&self, key: &str, value: &str) {
        let _ = self.inner.set(key, value);
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.inner.get(key).ok().flatten()
    }

    /// Number of writes waiting for resolution.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Values of in-flight writes, oldest first.
    pub fn pending_values(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.value.clone())
            .collect()
    }

    /// Keys of in-flight writes, oldest first.
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.key.clone())
            .collect()
    }

    /// Wait until at least `count` writes are in flight.
    pub async fn wait_for_pending(&self, count: usize) {
        loop {
            let arrived = self.arrived.notified();
            if self.pending_count() >= count {
                return;
            }
            arrived.await;
        }
    }

    /// Resolve the oldest in-flight write. Returns false if none is pending.
    pub fn resolve_oldest(&self, outcome: WriteOutcome) -> bool {
        let write = self.pending.lock().unwrap().pop_front();
        Self::resolve(write, outcome)
    }

    /// Resolve the newest in-flight write. Returns false if none is pending.
    pub fn resolve_newest(&self, outcome: WriteOutcome) -> bool {
        let write = self.pending.lock().unwrap().pop_back();
        Self::resolve(write, outcome)
    }

    fn resolve(write: Option<PendingWrite>, outcome: WriteOutcome) -> bool {
        match write {
            Some(write) => {
                let _ = write.resolve.send(outcome);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AsyncPersistence for GatedPersistence {
    async fn get(&self, key: &str) -> PersistResult<Option<String>> {
        self.inner.get(key)
    }

    async fn set(&self, key: &str, value: String) -> PersistResult<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(PendingWrite {
            key: key.to_string(),
            value: value.clone(),
            resolve: tx,
        });
        self.arrived.notify_waiters();

        let outcome = rx
            .await
            .map_err(|_| PersistError::Unavailable("write abandoned".into()))?;

        match outcome {
            WriteOutcome::Commit => {
                self.inner.set(key, &value)?;
                Ok(value)
            }
            WriteOutcome::CommitAs(canonical) => {
                self.inner.set(key, &canonical)?;
                Ok(canonical)
            }
            WriteOutcome::Reject(reason) => Err(PersistError::Unavailable(reason)),
        }
    }

    async fn remove(&self, key: &str) -> PersistResult<()> {
        self.inner.remove(key)
    }
}

/// Broadcaster that records what stores open and post, and lets tests inject
/// inbound messages synchronously.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    channels: Arc<Mutex<Vec<Arc<RecordingChannel>>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every channel opened, in order.
    pub fn opened(&self) -> Vec<String> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// The most recently opened endpoint named `name`.
    pub fn channel(&self, name: &str) -> Option<Arc<RecordingChannel>> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn open(&self, name: &str) -> Result<Arc<dyn Channel>, BroadcastError> {
        let channel = Arc::new(RecordingChannel {
            name: name.to_string(),
            posted: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel)
    }
}

/// Endpoint opened by a [`RecordingBroadcaster`].
pub struct RecordingChannel {
    name: String,
    posted: Mutex<Vec<Value>>,
    listeners: Mutex<Vec<Listener>>,
    closed: AtomicBool,
}

impl RecordingChannel {
    /// Every message posted on this endpoint.
    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().unwrap().clone()
    }

    /// Deliver `message` to this endpoint's listeners, as if a peer posted it.
    pub fn inject(&self, message: Value) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(message.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: Value) -> Result<(), BroadcastError> {
        if self.is_closed() {
            return Err(BroadcastError::ChannelClosed(self.name.clone()));
        }
        self.posted.lock().unwrap().push(message);
        Ok(())
    }

    fn on_message(&self, listener: Listener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every value an observer callback receives.
pub struct Probe<T> {
    seen: Arc<Mutex<Vec<T>>>,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T: Clone + Send + 'static> Probe<T> {
    pub fn new() -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Arc<dyn Fn(&T) + Send + Sync> =
            Arc::new(move |value: &T| sink.lock().unwrap().push(value.clone()));
        Self { seen, callback }
    }

    /// The observer callback. Always the same `Arc`, so subscribing it twice
    /// is detectable.
    pub fn callback(&self) -> Arc<dyn Fn(&T) + Send + Sync> {
        Arc::clone(&self.callback)
    }

    pub fn seen(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<T> {
        self.seen.lock().unwrap().last().cloned()
    }
}

impl<T: Clone + Send + 'static> Default for Probe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probe_persistence_records_and_fails() {
        let probe = ProbePersistence::new();
        probe.set("k", "1").unwrap();
        probe.fail_writes(true);
        assert!(probe.set("k", "2").is_err());

        assert_eq!(probe.stored("k").as_deref(), Some("1"));
        assert_eq!(
            probe.writes(),
            vec![
                ("k".to_string(), "1".to_string()),
                ("k".to_string(), "2".to_string())
            ]
        );

        probe.fail_reads(true);
        assert!(probe.get("k").is_err());
    }

    #[tokio::test]
    async fn test_gated_persistence_out_of_order() {
        let gated = Arc::new(GatedPersistence::new());

        let first = tokio::spawn({
            let gated = Arc::clone(&gated);
            async move { gated.set("k", "1".to_string()).await }
        });
        gated.wait_for_pending(1).await;
        let second = tokio::spawn({
            let gated = Arc::clone(&gated);
            async move { gated.set("k", "2".to_string()).await }
        });
        gated.wait_for_pending(2).await;
        assert_eq!(gated.pending_values(), vec!["1", "2"]);

        assert!(gated.resolve_newest(WriteOutcome::Commit));
        assert_eq!(second.await.unwrap().unwrap(), "2");

        assert!(gated.resolve_oldest(WriteOutcome::Reject("full".into())));
        assert!(first.await.unwrap().is_err());
        assert_eq!(gated.stored("k").as_deref(), Some("2"));
        assert!(!gated.resolve_oldest(WriteOutcome::Commit));
    }

    #[test]
    fn test_recording_channel_inject() {
        let broadcaster = RecordingBroadcaster::new();
        let channel = broadcaster.open("!store::a").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.on_message(Arc::new(move |msg| sink.lock().unwrap().push(msg)));

        let recorded = broadcaster.channel("!store::a").unwrap();
        recorded.inject(json!(1));
        channel.post(json!(2)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        assert_eq!(recorded.posted(), vec![json!(2)]);
        assert_eq!(broadcaster.opened(), vec!["!store::a"]);
    }

    #[test]
    fn test_probe_callback_identity() {
        let probe = Probe::<i32>::new();
        assert!(Arc::ptr_eq(&probe.callback(), &probe.callback()));
        (probe.callback())(&3);
        assert_eq!(probe.seen(), vec![3]);
    }
}
