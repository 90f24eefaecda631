//! The Registry: one shared store per namespace.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use sharedstore_broadcast::Broadcaster;
use sharedstore_core::{Namespace, SetOptions, StoreOptions, StoreValue};
use sharedstore_persist::{AsyncPersistence, SyncPersistence};

use crate::binding::Binding;
use crate::config::{Capabilities, RegistryConfig};
use crate::error::{Result, StoreError};
use crate::persistence::Persistence;
use crate::store::{Observer, Store};

struct Slot {
    store: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Maps namespaces to their stores.
///
/// The first request for a namespace creates its store; every later request,
/// from any call site, gets the same store back and its initial value and
/// options are ignored.
///
/// # Example
///
/// ```rust
/// use sharedstore::{Registry, RegistryConfig, StoreOptions};
///
/// let registry = Registry::new(RegistryConfig::default());
/// let counter = registry.get_or_create("counter", 1, StoreOptions::new()).unwrap();
/// counter.set_state(2);
///
/// let again = registry.get_or_create("counter", 99, StoreOptions::new()).unwrap();
/// assert_eq!(again.get(), 2);
/// ```
pub struct Registry {
    caps: Capabilities,
    stores: RwLock<HashMap<Namespace, Slot>>,
}

impl Registry {
    /// Create a registry with no persistence and no broadcast.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_capabilities(Capabilities::new(config))
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Use a synchronous persistence backend.
    pub fn with_sync_persistence(self, backend: Arc<dyn SyncPersistence>) -> Self {
        self.with_persistence(Persistence::Sync(backend))
    }

    /// Use an asynchronous persistence backend.
    pub fn with_async_persistence(self, backend: Arc<dyn AsyncPersistence>) -> Self {
        self.with_persistence(Persistence::Async(backend))
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.caps.persistence = Some(persistence);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.caps.broadcaster = Some(broadcaster);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.caps.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the store for `namespace`, creating it on first request.
    ///
    /// A new store starts from the persisted value when `options.persist` is
    /// set and one exists, otherwise from `initial`. Stores backed by
    /// asynchronous persistence hydrate in the background; use
    /// [`get_or_create_async`](Self::get_or_create_async) to wait for it.
    ///
    /// # Errors
    ///
    /// - `InvalidNamespace` if `namespace` is not a valid identifier; no
    ///   store is created.
    /// - `TypeMismatch` if the namespace holds a store of another value type.
    pub fn get_or_create<T: StoreValue>(
        &self,
        namespace: &str,
        initial: T,
        options: StoreOptions,
    ) -> Result<Arc<Store<T>>> {
        let namespace = Namespace::new(namespace)?;
        let (store, _) = self.get_or_insert(namespace, initial, options)?;
        Ok(store)
    }

    /// Like [`get_or_create`](Self::get_or_create), but waits until the store
    /// has been hydrated from asynchronous persistence.
    pub async fn get_or_create_async<T: StoreValue>(
        &self,
        namespace: &str,
        initial: T,
        options: StoreOptions,
    ) -> Result<Arc<Store<T>>> {
        let store = self.get_or_create(namespace, initial, options)?;
        store.hydrate().await;
        Ok(store)
    }

    /// Look up an existing store.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` if no store exists for `namespace`.
    pub fn get<T: StoreValue>(&self, namespace: &str) -> Result<Arc<Store<T>>> {
        let stores = self.read_stores();
        let slot = stores
            .get(namespace)
            .ok_or_else(|| StoreError::StoreNotFound(namespace.to_string()))?;
        downcast(namespace, slot)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.read_stores().contains_key(namespace)
    }

    /// Namespaces with a live store, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read_stores()
            .keys()
            .map(|ns| ns.as_str().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read_stores().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_stores().is_empty()
    }

    /// The store for `namespace` and whether this call created it.
    fn get_or_insert<T: StoreValue>(
        &self,
        namespace: Namespace,
        initial: T,
        options: StoreOptions,
    ) -> Result<(Arc<Store<T>>, bool)> {
        if let Some(slot) = self.read_stores().get(&namespace) {
            return Ok((downcast(namespace.as_str(), slot)?, false));
        }

        let mut stores = self.write_stores();
        if let Some(slot) = stores.get(&namespace) {
            return Ok((downcast(namespace.as_str(), slot)?, false));
        }

        debug!(namespace = %namespace, persist = options.persist, broadcast = options.broadcast, "creating store");
        let store = Store::open(namespace.clone(), initial, options, &self.caps);
        stores.insert(
            namespace,
            Slot {
                store: store.clone() as Arc<dyn Any + Send + Sync>,
                type_name: type_name::<T>(),
            },
        );
        Ok((store, true))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Set the value of `namespace`, creating its store with `value` as the
    /// initial value if needed.
    pub fn set_value<T: StoreValue>(&self, namespace: &str, value: T) -> Result<()> {
        self.set_value_with(namespace, value, StoreOptions::new())
    }

    /// Like [`set_value`](Self::set_value); `options` apply only if the store
    /// is created by this call.
    ///
    /// A store created here starts from `value` and is not written through:
    /// a persisted value, if any, wins.
    pub fn set_value_with<T: StoreValue>(
        &self,
        namespace: &str,
        value: T,
        options: StoreOptions,
    ) -> Result<()> {
        let namespace = Namespace::new(namespace)?;
        let (store, created) = self.get_or_insert(namespace, value.clone(), options)?;
        if !created {
            store.set_state_with(value, SetOptions::default());
        }
        Ok(())
    }

    /// [`set_value_with`](Self::set_value_with) with persistence enabled.
    pub fn persist<T: StoreValue>(&self, namespace: &str, value: T) -> Result<()> {
        self.set_value_with(namespace, value, StoreOptions::persisted())
    }

    /// Remove the durable mirror of `namespace`.
    ///
    /// The live store, its value and its observers are left untouched.
    /// Backend failures are logged, not returned. On an asynchronous backend
    /// the removal is spawned; use
    /// [`clear_persisted_async`](Self::clear_persisted_async) to wait for it.
    pub fn clear_persisted(&self, namespace: &str) -> Result<()> {
        let namespace = Namespace::new(namespace)?;
        let key = namespace.storage_key(&self.caps.config.key_prefix);

        match &self.caps.persistence {
            Some(Persistence::Sync(backend)) => {
                if let Err(e) = backend.remove(&key) {
                    warn!(namespace = %namespace, error = %e, "failed to clear persisted value");
                }
            }
            Some(Persistence::Async(backend)) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    warn!(namespace = %namespace, "no async runtime, persisted value not cleared");
                    return Ok(());
                };
                let backend = Arc::clone(backend);
                handle.spawn(async move {
                    if let Err(e) = backend.remove(&key).await {
                        warn!(namespace = %namespace, error = %e, "failed to clear persisted value");
                    }
                });
            }
            None => {}
        }
        Ok(())
    }

    /// Remove the durable mirror of `namespace` and wait for the backend.
    pub async fn clear_persisted_async(&self, namespace: &str) -> Result<()> {
        let namespace = Namespace::new(namespace)?;
        let key = namespace.storage_key(&self.caps.config.key_prefix);

        let outcome = match &self.caps.persistence {
            Some(Persistence::Sync(backend)) => backend.remove(&key),
            Some(Persistence::Async(backend)) => backend.remove(&key).await,
            None => Ok(()),
        };
        if let Err(e) = outcome {
            warn!(namespace = %namespace, error = %e, "failed to clear persisted value");
        }
        Ok(())
    }

    /// Drop every store. Stores still referenced elsewhere keep working but
    /// are no longer shared.
    pub fn reset(&self) {
        let mut stores = self.write_stores();
        debug!(count = stores.len(), "resetting registry");
        stores.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe a UI-style consumer to `namespace`.
    ///
    /// `on_change` is called after every transition, once the binding's local
    /// copy of the value has been updated. Dropping the returned [`Binding`]
    /// unsubscribes it.
    pub fn bind<T, F>(
        &self,
        namespace: &str,
        initial: T,
        options: StoreOptions,
        on_change: F,
    ) -> Result<Binding<T>>
    where
        T: StoreValue,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let store = self.get_or_create(namespace, initial, options)?;
        let on_change: Observer<T> = Arc::new(on_change);
        Ok(Binding::attach(store, on_change))
    }

    fn read_stores(&self) -> RwLockReadGuard<'_, HashMap<Namespace, Slot>> {
        self.stores.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_stores(&self) -> RwLockWriteGuard<'_, HashMap<Namespace, Slot>> {
        self.stores.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

fn downcast<T: StoreValue>(namespace: &str, slot: &Slot) -> Result<Arc<Store<T>>> {
    Arc::clone(&slot.store)
        .downcast::<Store<T>>()
        .map_err(|_| StoreError::TypeMismatch {
            namespace: namespace.to_string(),
            existing: slot.type_name,
            requested: type_name::<T>(),
        })
}
