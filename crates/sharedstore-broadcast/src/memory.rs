//! A simple in-process broadcast transport.
//!
//! Uses channels to simulate same-origin message passing between execution
//! contexts. Each endpoint owns an unbounded mpsc receiver drained by a pump
//! task that hands messages to its listeners, so delivery is always
//! asynchronous with respect to `post`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::{Broadcaster, Channel, Listener};
use crate::error::{BroadcastError, Result};

/// Shared routing table for the memory transport.
#[derive(Clone, Default)]
pub struct MemoryHub {
    shared: Arc<HubShared>,
}

#[derive(Default)]
struct HubShared {
    /// Deliver posts back to the posting endpoint as well.
    loopback: bool,
    routes: Mutex<Routes>,
}

#[derive(Default)]
struct Routes {
    next_id: u64,
    ports: HashMap<String, Vec<Port>>,
}

struct Port {
    id: u64,
    tx: mpsc::UnboundedSender<Value>,
}

impl MemoryHub {
    /// Create a hub where posts reach every endpoint except the sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub that also echoes posts back to the sender.
    pub fn with_loopback() -> Self {
        Self {
            shared: Arc::new(HubShared {
                loopback: true,
                routes: Mutex::new(Routes::default()),
            }),
        }
    }

    /// Open an endpoint on channel `name`.
    ///
    /// Must be called from within a tokio runtime; the endpoint's pump task
    /// is spawned on it.
    pub fn open_channel(&self, name: &str) -> Result<MemoryChannel> {
        let handle = Handle::try_current().map_err(|_| BroadcastError::NoRuntime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

        let id = {
            let mut routes = self.routes();
            routes.next_id += 1;
            let id = routes.next_id;
            routes
                .ports
                .entry(name.to_string())
                .or_default()
                .push(Port { id, tx });
            id
        };

        let listeners: Arc<RwLock<Vec<Listener>>> = Arc::new(RwLock::new(Vec::new()));
        let pump_listeners = Arc::clone(&listeners);
        let pump = handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                let listeners = pump_listeners
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for listener in listeners {
                    listener(message.clone());
                }
            }
        });

        tracing::trace!(channel = name, id, "opened memory channel");

        Ok(MemoryChannel {
            id,
            name: name.to_string(),
            hub: self.clone(),
            listeners,
            closed: AtomicBool::new(false),
            pump,
        })
    }

    /// Number of open endpoints on channel `name`.
    pub fn endpoint_count(&self, name: &str) -> usize {
        self.routes().ports.get(name).map_or(0, Vec::len)
    }

    fn deliver(&self, from: u64, name: &str, message: Value) -> usize {
        let routes = self.routes();
        let Some(ports) = routes.ports.get(name) else {
            return 0;
        };

        let mut delivered = 0;
        for port in ports {
            if port.id == from && !self.shared.loopback {
                continue;
            }
            // Ignore errors (the endpoint may be mid-close).
            if port.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn detach(&self, name: &str, id: u64) {
        let mut routes = self.routes();
        if let Some(ports) = routes.ports.get_mut(name) {
            ports.retain(|p| p.id != id);
            if ports.is_empty() {
                routes.ports.remove(name);
            }
        }
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.shared
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Broadcaster for MemoryHub {
    fn open(&self, name: &str) -> Result<Arc<dyn Channel>> {
        Ok(Arc::new(self.open_channel(name)?))
    }
}

/// Endpoint of a [`MemoryHub`] channel.
pub struct MemoryChannel {
    id: u64,
    name: String,
    hub: MemoryHub,
    listeners: Arc<RwLock<Vec<Listener>>>,
    closed: AtomicBool,
    pump: JoinHandle<()>,
}

impl MemoryChannel {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: Value) -> Result<()> {
        if self.is_closed() {
            return Err(BroadcastError::ChannelClosed(self.name.clone()));
        }
        let delivered = self.hub.deliver(self.id, &self.name, message);
        tracing::trace!(channel = %self.name, delivered, "posted message");
        Ok(())
    }

    fn on_message(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Dropping our sender ends the pump once queued messages drain.
            self.hub.detach(&self.name, self.id);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn collector() -> (Listener, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener = Arc::new(move |msg| sink.lock().unwrap().push(msg));
        (listener, seen)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_post_reaches_peers_not_self() {
        let hub = MemoryHub::new();
        let a = hub.open_channel("!store::tab").unwrap();
        let b = hub.open_channel("!store::tab").unwrap();
        let c = hub.open_channel("!store::other").unwrap();

        let (la, seen_a) = collector();
        let (lb, seen_b) = collector();
        let (lc, seen_c) = collector();
        a.on_message(la);
        b.on_message(lb);
        c.on_message(lc);

        a.post(json!({ "instanceId": "a", "message": 1 })).unwrap();
        settle().await;

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(
            *seen_b.lock().unwrap(),
            vec![json!({ "instanceId": "a", "message": 1 })]
        );
        assert!(seen_c.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loopback_echoes_to_sender() {
        let hub = MemoryHub::with_loopback();
        let a = hub.open_channel("ch").unwrap();
        let (la, seen_a) = collector();
        a.on_message(la);

        a.post(json!("hello")).unwrap();
        settle().await;

        assert_eq!(*seen_a.lock().unwrap(), vec![json!("hello")]);
    }

    #[tokio::test]
    async fn test_close_detaches() {
        let hub = MemoryHub::new();
        let a = hub.open_channel("ch").unwrap();
        let b = hub.open_channel("ch").unwrap();
        assert_eq!(hub.endpoint_count("ch"), 2);

        b.close();
        assert_eq!(hub.endpoint_count("ch"), 1);
        assert!(matches!(
            b.post(json!(1)),
            Err(BroadcastError::ChannelClosed(_))
        ));

        drop(a);
        assert_eq!(hub.endpoint_count("ch"), 0);
    }

    #[test]
    fn test_open_without_runtime() {
        let hub = MemoryHub::new();
        assert!(matches!(
            hub.open_channel("ch"),
            Err(BroadcastError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_message_order_preserved() {
        let hub = MemoryHub::new();
        let a = hub.open_channel("ch").unwrap();
        let b = hub.open_channel("ch").unwrap();
        let (lb, seen_b) = collector();
        b.on_message(lb);

        for i in 0..20 {
            a.post(json!(i)).unwrap();
        }
        settle().await;

        let expected: Vec<Value> = (0..20).map(|i| json!(i)).collect();
        assert_eq!(*seen_b.lock().unwrap(), expected);
    }
}
