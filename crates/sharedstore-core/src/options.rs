//! Per-store and per-call options.

use serde::{Deserialize, Serialize};

/// Mirroring configuration of a store, fixed at first construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Mirror the value to durable storage.
    pub persist: bool,
    /// Mirror the value to peer contexts.
    pub broadcast: bool,
}

impl StoreOptions {
    pub const fn new() -> Self {
        Self {
            persist: false,
            broadcast: false,
        }
    }

    /// Options with persistence enabled.
    pub const fn persisted() -> Self {
        Self {
            persist: true,
            broadcast: false,
        }
    }

    /// Options with broadcast enabled.
    pub const fn broadcasting() -> Self {
        Self {
            persist: false,
            broadcast: true,
        }
    }

    pub const fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub const fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }
}

/// Options for a single state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Publish the new value to peers (if the store broadcasts at all).
    pub broadcast: bool,
}

impl SetOptions {
    /// Apply locally without publishing. Used for inbound peer messages.
    pub const fn local() -> Self {
        Self { broadcast: false }
    }
}

impl Default for SetOptions {
    fn default() -> Self {
        Self { broadcast: true }
    }
}
