//! Channel abstraction for broadcast delivery.
//!
//! A [`Broadcaster`] opens named channels; every channel opened under the same
//! name in the same origin receives what the others post. Messages are plain
//! JSON so the transport never needs to know the envelope or value types.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Callback invoked for every inbound message on a channel.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// One endpoint of a named broadcast channel.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait Channel: Send + Sync {
    /// The channel name this endpoint was opened with.
    fn name(&self) -> &str;

    /// Publish a message to every peer endpoint of this channel.
    ///
    /// Delivery is asynchronous; returning `Ok` only means the message was
    /// handed to the transport.
    fn post(&self, message: Value) -> Result<()>;

    /// Register a listener for inbound messages.
    fn on_message(&self, listener: Listener);

    /// Stop sending and receiving. Further posts fail.
    fn close(&self);
}

/// Factory for channel endpoints.
pub trait Broadcaster: Send + Sync {
    /// Open an endpoint on the channel called `name`.
    fn open(&self, name: &str) -> Result<Arc<dyn Channel>>;
}
