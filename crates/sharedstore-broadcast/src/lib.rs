//! # sharedstore broadcast
//!
//! Cross-context mirroring for sharedstore. Stores with broadcast enabled
//! open a channel named after their storage key, publish every local change
//! as an envelope and apply what peers publish.
//!
//! ## Key Properties
//!
//! - **Asynchronous**: delivery never happens inside `post`
//! - **Same-origin**: only endpoints opened on the same hub and name talk
//! - **Coalesced**: inbound bursts are collapsed by [`Debounce`]
//!
//! ## Message Flow
//!
//! ```text
//! Context A                          Context B
//!   set_state(v)
//!   |-- post {instanceId: A, v} ---->|
//!   |                                |-- debounce (300ms quiet)
//!   |                                |-- set_state(v, broadcast: false)
//! ```

pub mod channel;
pub mod debounce;
pub mod error;
pub mod memory;

pub use channel::{Broadcaster, Channel, Listener};
pub use debounce::{Debounce, DEFAULT_COALESCE_INTERVAL};
pub use error::{BroadcastError, Result};
pub use memory::{MemoryChannel, MemoryHub};
