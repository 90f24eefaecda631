//! # sharedstore core
//!
//! Pure primitives shared by every sharedstore crate: validated namespaces,
//! instance identity, the broadcast envelope, store options and the JSON value
//! codec.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Namespace`] - Validated identity of a store
//! - [`InstanceId`] - Random id distinguishing one store instance from its peers
//! - [`Envelope`] - Wire shape of a broadcast message
//! - [`StoreOptions`] / [`SetOptions`] - Mirroring configuration
//! - [`StoreValue`] - Bound for values a store can hold

pub mod envelope;
pub mod error;
pub mod namespace;
pub mod options;
pub mod value;

pub use envelope::{Envelope, InstanceId};
pub use error::{CoreError, Result};
pub use namespace::{validate_namespace, Namespace, DEFAULT_KEY_PREFIX};
pub use options::{SetOptions, StoreOptions};
pub use value::{decode, encode, StoreValue};
