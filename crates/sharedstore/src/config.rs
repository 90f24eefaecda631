//! Registry configuration and host capabilities.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sharedstore_broadcast::{Broadcaster, DEFAULT_COALESCE_INTERVAL};
use sharedstore_core::DEFAULT_KEY_PREFIX;

use crate::persistence::Persistence;

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Prefix prepended to namespaces to form persistence keys and channel
    /// names.
    pub key_prefix: String,
    /// Quiet period after which a burst of inbound broadcast messages is
    /// applied.
    pub coalesce_interval: Duration,
}

impl RegistryConfig {
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_coalesce_interval(mut self, interval: Duration) -> Self {
        self.coalesce_interval = interval;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            coalesce_interval: DEFAULT_COALESCE_INTERVAL,
        }
    }
}

/// What the host environment offers stores: configuration plus the optional
/// persistence and broadcast capabilities.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub config: RegistryConfig,
    pub persistence: Option<Persistence>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl Capabilities {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            persistence: None,
            broadcaster: None,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("config", &self.config)
            .field("persistence", &self.persistence)
            .field("broadcaster", &self.broadcaster.is_some())
            .finish()
    }
}
