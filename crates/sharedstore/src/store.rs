//! The Store: one namespaced reactive cell.
//!
//! A Store holds a value, fans every change out to its observers and,
//! depending on its [`StoreOptions`], mirrors the value into persistence and
//! onto a broadcast channel shared with peer contexts.
//!
//! ## State transitions
//!
//! [`Store::set_state`] is the only way the value changes from the outside.
//! It assigns the value, writes it through persistence, notifies observers in
//! subscription order and finally publishes it to peers. Two internal paths
//! may also replace the value:
//!
//! - hydration from an asynchronous backend, applied only while no
//!   `set_state` has happened yet;
//! - the canonical echo of an asynchronous write, applied only while that
//!   write is still the newest one.
//!
//! Every `set_state` bumps a write sequence number; both paths compare
//! against it so a late resolution never clobbers a newer value.
//!
//! Transitions are serialized per store: assignment, write-through and
//! fan-out of one transition complete before the next begins, on any thread.
//! A `set_state` issued by an observer during fan-out is deferred and applied
//! once the current fan-out has reached every observer, so the last value each
//! observer sees is always the value the store holds.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::thread::{self, ThreadId};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use sharedstore_broadcast::{Channel, Debounce};
use sharedstore_core::{
    decode, encode, Envelope, InstanceId, Namespace, SetOptions, StoreOptions, StoreValue,
};
use sharedstore_persist::{AsyncPersistence, PersistError, Result as PersistResult};

use crate::config::Capabilities;
use crate::error::Result;
use crate::persistence::Persistence;

/// Callback invoked with the value after every state transition.
///
/// Observers are identified by `Arc` pointer: subscribing a clone of the same
/// `Arc` twice registers it once.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as an [`Observer`].
pub fn observer<T, F>(f: F) -> Observer<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_observer<T>(a: &Observer<T>, b: &Observer<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct State<T> {
    value: T,
    /// Bumped by every `set_state`.
    write_seq: u64,
    /// Sequence number of the newest write whose outcome has been recorded.
    settled_seq: u64,
    last_error: Option<Arc<PersistError>>,
}

/// Held for the duration of one transition and its deferred follow-ups.
struct Transition<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _held: MutexGuard<'a, ()>,
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A namespaced reactive value.
pub struct Store<T: StoreValue> {
    namespace: Namespace,
    key: String,
    instance_id: InstanceId,
    options: StoreOptions,
    state: RwLock<State<T>>,
    observers: RwLock<Vec<Observer<T>>>,
    transition: Mutex<()>,
    /// Thread currently holding `transition`.
    owner: Mutex<Option<ThreadId>>,
    /// Sets issued from inside a fan-out, applied after it.
    deferred: Mutex<VecDeque<(T, SetOptions)>>,
    persistence: Option<Persistence>,
    channel: Option<Arc<dyn Channel>>,
    inbound: Option<Debounce<Envelope>>,
    hydration: OnceCell<()>,
    me: Weak<Self>,
}

impl<T: StoreValue> Store<T> {
    /// Create a standalone store.
    ///
    /// Most callers go through a [`Registry`](crate::Registry), which keeps a
    /// single store per namespace. A store created here shares nothing with
    /// other stores except what its capabilities connect it to.
    pub fn new(
        namespace: &str,
        initial: T,
        options: StoreOptions,
        caps: &Capabilities,
    ) -> Result<Arc<Self>> {
        let namespace = Namespace::new(namespace)?;
        Ok(Self::open(namespace, initial, options, caps))
    }

    pub(crate) fn open(
        namespace: Namespace,
        initial: T,
        options: StoreOptions,
        caps: &Capabilities,
    ) -> Arc<Self> {
        let key = namespace.storage_key(&caps.config.key_prefix);

        let persistence = if options.persist {
            if caps.persistence.is_none() {
                debug!(namespace = %namespace, "persistence requested but not available");
            }
            caps.persistence.clone()
        } else {
            None
        };

        let value = match &persistence {
            Some(Persistence::Sync(backend)) => {
                match backend.get(&key) {
                    Ok(Some(raw)) => match decode::<T>(&raw) {
                        Ok(stored) => {
                            debug!(namespace = %namespace, key = %key, "hydrated from persistence");
                            stored
                        }
                        Err(e) => {
                            debug!(namespace = %namespace, error = %e, "stored value unreadable, keeping initial");
                            initial
                        }
                    },
                    Ok(None) => initial,
                    Err(e) => {
                        debug!(namespace = %namespace, error = %e, "persistence read failed, keeping initial");
                        initial
                    }
                }
            }
            _ => initial,
        };

        let runtime = if options.broadcast && caps.broadcaster.is_some() {
            let handle = Handle::try_current().ok();
            if handle.is_none() {
                warn!(namespace = %namespace, "no async runtime, broadcast disabled");
            }
            handle
        } else {
            if options.broadcast {
                debug!(namespace = %namespace, "broadcast requested but not available");
            }
            None
        };

        let store = Arc::new_cyclic(|me: &Weak<Self>| {
            let (channel, inbound) = match (&caps.broadcaster, runtime) {
                (Some(broadcaster), Some(handle)) => match broadcaster.open(&key) {
                    Ok(channel) => {
                        let sink = me.clone();
                        let inbound = Debounce::with_handle(
                            handle,
                            caps.config.coalesce_interval,
                            move |envelope: Envelope| {
                                if let Some(store) = sink.upgrade() {
                                    store.apply_envelope(envelope);
                                }
                            },
                        );

                        let listener = me.clone();
                        channel.on_message(Arc::new(move |raw: Value| {
                            if let Some(store) = listener.upgrade() {
                                store.handle_inbound_message(raw);
                            }
                        }));

                        (Some(channel), Some(inbound))
                    }
                    Err(e) => {
                        warn!(namespace = %namespace, error = %e, "failed to open broadcast channel");
                        (None, None)
                    }
                },
                _ => (None, None),
            };

            Self {
                namespace,
                key,
                instance_id: InstanceId::random(),
                options,
                state: RwLock::new(State {
                    value,
                    write_seq: 0,
                    settled_seq: 0,
                    last_error: None,
                }),
                observers: RwLock::new(Vec::new()),
                transition: Mutex::new(()),
                owner: Mutex::new(None),
                deferred: Mutex::new(VecDeque::new()),
                persistence,
                channel,
                inbound,
                hydration: OnceCell::new(),
                me: me.clone(),
            }
        });

        store.spawn_hydration();
        store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Persistence key and broadcast channel name of this store.
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Whether this store is connected to a broadcast channel.
    pub fn is_broadcasting(&self) -> bool {
        self.channel.is_some()
    }

    /// A clone of the current value.
    pub fn get(&self) -> T {
        self.read_state().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// `f` runs under the state lock and must not call back into the store.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read_state().value)
    }

    /// The most recent persistence write failure, if it has not been
    /// superseded by a successful write.
    pub fn last_error(&self) -> Option<Arc<PersistError>> {
        self.read_state().last_error.clone()
    }

    pub fn clear_last_error(&self) {
        self.write_state().last_error = None;
    }

    pub fn observer_count(&self) -> usize {
        self.read_observers().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `observer`. Returns false if it was already registered.
    pub fn subscribe(&self, observer: Observer<T>) -> bool {
        let mut observers = self.write_observers();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Remove `observer`. Returns false if it was not registered.
    pub fn unsubscribe(&self, observer: &Observer<T>) -> bool {
        let mut observers = self.write_observers();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        observers.len() != before
    }

    fn notify(&self, value: &T) {
        let observers = self.read_observers().clone();
        for observer in &observers {
            observer(value);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the value and publish it to peers.
    pub fn set_state(&self, value: T) {
        self.set_state_with(value, SetOptions::default());
    }

    /// Replace the value.
    ///
    /// Persistence and broadcast failures never propagate. A failed write,
    /// synchronous or asynchronous, is logged and also captured into
    /// [`last_error`](Self::last_error) so callers can surface it; synchronous
    /// backends are not log-only. Broadcast failures are only logged.
    ///
    /// Called from an observer during fan-out, the set is deferred until every
    /// observer has seen the current value, then applied in call order.
    pub fn set_state_with(&self, value: T, set_options: SetOptions) {
        if self.in_transition() {
            trace!(namespace = %self.namespace, "deferring set from observer");
            self.lock_deferred().push_back((value, set_options));
            return;
        }
        let _transition = self.begin_transition();
        self.apply(value, set_options);
        self.drain_deferred();
    }

    /// Read-modify-write built on [`set_state`](Self::set_state).
    ///
    /// `f` sees the value as of the call; no other transition runs between
    /// the read and the write.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        if self.in_transition() {
            let next = self.read(f);
            self.lock_deferred().push_back((next, SetOptions::default()));
            return;
        }
        let _transition = self.begin_transition();
        let next = self.read(f);
        self.apply(next, SetOptions::default());
        self.drain_deferred();
    }

    /// One transition. Caller holds `transition`.
    fn apply(&self, value: T, set_options: SetOptions) {
        let seq = {
            let mut state = self.write_state();
            state.value = value.clone();
            state.write_seq += 1;
            state.write_seq
        };
        trace!(namespace = %self.namespace, seq, "set_state");

        if let Some(persistence) = &self.persistence {
            self.write_through(persistence, seq, &value);
        }

        self.notify(&value);

        if set_options.broadcast {
            self.publish(&value);
        }
    }

    fn drain_deferred(&self) {
        loop {
            let next = self.lock_deferred().pop_front();
            match next {
                Some((value, set_options)) => self.apply(value, set_options),
                None => break,
            }
        }
    }

    fn in_transition(&self) -> bool {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    fn begin_transition(&self) -> Transition<'_> {
        let held = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Transition {
            owner: &self.owner,
            _held: held,
        }
    }

    /// Run `f` as a transition of its own: serialized against `set_state`,
    /// with sets deferred during it applied afterwards.
    fn exclusive(&self, f: impl FnOnce()) {
        let _transition = self.begin_transition();
        f();
        self.drain_deferred();
    }

    fn write_through(&self, persistence: &Persistence, seq: u64, value: &T) {
        let encoded = match encode(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                let _ = self.settle_write(seq, Err(PersistError::Serialization(e.to_string())));
                return;
            }
        };

        match persistence {
            Persistence::Sync(backend) => {
                let outcome = backend.set(&self.key, &encoded).map(|()| None);
                // A sync write has no canonical form to adopt.
                let _ = self.settle_write(seq, outcome);
            }
            Persistence::Async(backend) => {
                let Ok(handle) = Handle::try_current() else {
                    let _ = self.settle_write(
                        seq,
                        Err(PersistError::Unavailable("no async runtime".into())),
                    );
                    return;
                };

                let backend = Arc::clone(backend);
                let key = self.key.clone();
                let me = self.me.clone();
                handle.spawn(async move {
                    let outcome = backend.set(&key, encoded).await.map(Some);
                    if let Some(store) = me.upgrade() {
                        store.exclusive(|| {
                            if let Some(value) = store.settle_write(seq, outcome) {
                                store.notify(&value);
                            }
                        });
                    }
                });
            }
        }
    }

    /// Record the outcome of write `seq`.
    ///
    /// `Ok(Some(canonical))` is the stored form reported by an asynchronous
    /// backend; it replaces the value only if `seq` is still the newest
    /// write and it differs from what the store holds; the adopted value is
    /// returned for the caller to fan out.
    fn settle_write(&self, seq: u64, outcome: PersistResult<Option<String>>) -> Option<T> {
        let mut state = self.write_state();
        match outcome {
            Ok(canonical) => {
                if seq < state.settled_seq {
                    trace!(namespace = %self.namespace, seq, "stale write resolution dropped");
                    return None;
                }
                state.settled_seq = seq;
                state.last_error = None;

                match canonical {
                    Some(raw) if seq == state.write_seq => self.adopt_canonical(&mut state, &raw),
                    Some(_) => {
                        trace!(namespace = %self.namespace, seq, "superseded write resolved");
                        None
                    }
                    None => None,
                }
            }
            Err(e) => {
                warn!(namespace = %self.namespace, key = %self.key, seq, error = %e, "persistence write failed");
                if seq >= state.settled_seq {
                    state.settled_seq = seq;
                    state.last_error = Some(Arc::new(e));
                }
                None
            }
        }
    }

    fn adopt_canonical(&self, state: &mut State<T>, raw: &str) -> Option<T> {
        let canonical = match decode::<T>(raw) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "canonical value unreadable");
                return None;
            }
        };

        let held = serde_json::to_value(&state.value).ok();
        let echoed = serde_json::from_str::<Value>(raw).ok();
        if held.is_some() && held == echoed {
            return None;
        }

        debug!(namespace = %self.namespace, "adopting canonical value from persistence");
        state.value = canonical.clone();
        Some(canonical)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hydration
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for the initial read from an asynchronous backend.
    ///
    /// Runs the read at most once; concurrent callers wait for the same read.
    /// The stored value is applied only if no `set_state` happened first.
    /// Returns immediately for stores without asynchronous persistence.
    pub async fn hydrate(&self) {
        let Some(Persistence::Async(backend)) = &self.persistence else {
            return;
        };
        self.hydration
            .get_or_init(|| self.load(backend.as_ref()))
            .await;
    }

    pub fn is_hydrated(&self) -> bool {
        match &self.persistence {
            Some(Persistence::Async(_)) => self.hydration.initialized(),
            _ => true,
        }
    }

    async fn load(&self, backend: &dyn AsyncPersistence) {
        let raw = match backend.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "persistence read failed, keeping initial");
                return;
            }
        };

        let stored = match decode::<T>(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "stored value unreadable, keeping initial");
                return;
            }
        };

        self.exclusive(|| {
            let applied = {
                let mut state = self.write_state();
                if state.write_seq == 0 {
                    state.value = stored.clone();
                    true
                } else {
                    false
                }
            };

            if applied {
                debug!(namespace = %self.namespace, key = %self.key, "hydrated from persistence");
                self.notify(&stored);
            } else {
                debug!(namespace = %self.namespace, "hydration superseded by local write");
            }
        });
    }

    fn spawn_hydration(&self) {
        if !matches!(self.persistence, Some(Persistence::Async(_))) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!(namespace = %self.namespace, "no async runtime, hydration deferred");
            return;
        };
        if let Some(store) = self.me.upgrade() {
            handle.spawn(async move { store.hydrate().await });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Broadcast
    // ─────────────────────────────────────────────────────────────────────────

    fn publish(&self, value: &T) {
        let Some(channel) = &self.channel else {
            return;
        };

        match Envelope::wrap(&self.instance_id, value) {
            Ok(envelope) => {
                if let Err(e) = channel.post(envelope.to_json()) {
                    warn!(namespace = %self.namespace, error = %e, "broadcast failed");
                }
            }
            Err(e) => warn!(namespace = %self.namespace, error = %e, "value not broadcastable"),
        }
    }

    /// Entry point for raw messages from the broadcast channel.
    ///
    /// Malformed and self-originated messages are dropped. The rest are
    /// coalesced: a burst is applied once, with its latest message, after the
    /// configured quiet interval.
    pub fn handle_inbound_message(&self, raw: Value) {
        let envelope = match Envelope::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "ignoring malformed envelope");
                return;
            }
        };

        if envelope.is_from(&self.instance_id) {
            trace!(namespace = %self.namespace, "ignoring self-originated envelope");
            return;
        }

        match &self.inbound {
            Some(inbound) => inbound.call(envelope),
            None => {
                self.apply_envelope(envelope);
            }
        }
    }

    /// Validate and apply a raw message immediately, bypassing coalescing.
    ///
    /// Returns whether the value was applied.
    pub fn apply_inbound(&self, raw: &Value) -> bool {
        match Envelope::from_json(raw) {
            Ok(envelope) => self.apply_envelope(envelope),
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "ignoring malformed envelope");
                false
            }
        }
    }

    /// Apply a pending coalesced message now. Returns whether one was pending.
    pub fn flush_inbound(&self) -> bool {
        self.inbound.as_ref().is_some_and(Debounce::flush)
    }

    fn apply_envelope(&self, envelope: Envelope) -> bool {
        if envelope.is_from(&self.instance_id) {
            return false;
        }

        match envelope.decode::<T>() {
            Ok(value) => {
                debug!(namespace = %self.namespace, from = %envelope.instance_id, "applying peer value");
                self.set_state_with(value, SetOptions::local());
                true
            }
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "peer value does not decode");
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────────

    fn read_state(&self) -> RwLockReadGuard<'_, State<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_observers(&self) -> RwLockReadGuard<'_, Vec<Observer<T>>> {
        self.observers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_observers(&self) -> RwLockWriteGuard<'_, Vec<Observer<T>>> {
        self.observers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deferred(&self) -> MutexGuard<'_, VecDeque<(T, SetOptions)>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: StoreValue> Drop for Store<T> {
    fn drop(&mut self) {
        if let Some(inbound) = &self.inbound {
            inbound.cancel();
        }
        if let Some(channel) = &self.channel {
            channel.close();
        }
    }
}

impl<T: StoreValue + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("Store")
            .field("namespace", &self.namespace)
            .field("instance_id", &self.instance_id)
            .field("options", &self.options)
            .field("value", &state.value)
            .field("write_seq", &state.write_seq)
            .field("observers", &self.observer_count())
            .finish()
    }
}
