//! Binding adapter for UI-style consumers.
//!
//! A UI component wants three things from a store: the current value, a
//! setter it can hand to event handlers and the last persistence error. A
//! [`Binding`] bundles them, keeps a local copy of the value current and
//! unsubscribes itself when dropped.
//!
//! Translating a UI change event into a value is an explicit step here
//! ([`Setter::on_change`]); the store's own setter only ever takes the final
//! value.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use sharedstore_core::StoreValue;
use sharedstore_persist::PersistError;

use crate::store::{Observer, Store};

/// A subscription of one consumer to one store.
pub struct Binding<T: StoreValue> {
    store: Arc<Store<T>>,
    local: Arc<RwLock<T>>,
    observer: Observer<T>,
}

impl<T: StoreValue> Binding<T> {
    /// Subscribe to `store`, calling `on_change` after every transition.
    pub fn attach(store: Arc<Store<T>>, on_change: Observer<T>) -> Self {
        let local = Arc::new(RwLock::new(store.get()));

        let sink = Arc::clone(&local);
        let observer: Observer<T> = Arc::new(move |value: &T| {
            *sink.write().unwrap_or_else(PoisonError::into_inner) = value.clone();
            on_change(value);
        });
        store.subscribe(Arc::clone(&observer));

        // A transition between the first read and subscribing is not
        // delivered; pick it up now.
        *local.write().unwrap_or_else(PoisonError::into_inner) = store.get();

        Self {
            store,
            local,
            observer,
        }
    }

    /// The value as of the last transition this binding observed.
    pub fn value(&self) -> T {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn setter(&self) -> Setter<T> {
        Setter {
            store: Arc::clone(&self.store),
        }
    }

    pub fn last_error(&self) -> Option<Arc<PersistError>> {
        self.store.last_error()
    }

    pub fn store(&self) -> &Arc<Store<T>> {
        &self.store
    }

    /// `(value, setter, last_error)` in one call.
    pub fn parts(&self) -> (T, Setter<T>, Option<Arc<PersistError>>) {
        (self.value(), self.setter(), self.last_error())
    }
}

impl<T: StoreValue> Drop for Binding<T> {
    fn drop(&mut self) {
        self.store.unsubscribe(&self.observer);
    }
}

impl<T: StoreValue + fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("namespace", self.store.namespace())
            .field("value", &self.value())
            .finish()
    }
}

/// A UI change event: the new raw value of the input that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub target_value: String,
}

impl ChangeEvent {
    pub fn new(target_value: impl Into<String>) -> Self {
        Self {
            target_value: target_value.into(),
        }
    }
}

/// Setter handed out by a [`Binding`]. Cheap to clone.
#[derive(Clone)]
pub struct Setter<T: StoreValue> {
    store: Arc<Store<T>>,
}

impl<T: StoreValue> Setter<T> {
    pub fn set(&self, value: T) {
        self.store.set_state(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.store.update(f);
    }

    /// Set the value from a change event's target value.
    pub fn on_change(&self, event: &ChangeEvent)
    where
        T: From<String>,
    {
        self.store.set_state(T::from(event.target_value.clone()));
    }

    /// Parse a change event's target value and set it.
    ///
    /// On a parse error the store is left unchanged.
    pub fn parse_change(&self, event: &ChangeEvent) -> Result<(), T::Err>
    where
        T: FromStr,
    {
        let value = event.target_value.parse::<T>()?;
        self.store.set_state(value);
        Ok(())
    }
}

impl<T: StoreValue> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("namespace", self.store.namespace())
            .finish()
    }
}
