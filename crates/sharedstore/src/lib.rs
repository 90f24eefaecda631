//! # sharedstore
//!
//! Namespaced reactive values shared across a process, optionally mirrored
//! to durable storage and to peer contexts.
//!
//! ## Overview
//!
//! - **Store**: one named cell holding a value, with ordered observers
//! - **Registry**: hands out a single store per namespace, to every caller
//! - **Persistence**: stores with `persist` write every value through a
//!   synchronous or asynchronous key-value backend and start from what it
//!   holds
//! - **Broadcast**: stores with `broadcast` publish every local value to
//!   peers on a same-origin channel and apply what peers publish
//! - **Binding**: value, setter and last error for UI-style consumers
//!
//! ## Key Concepts
//!
//! - **First writer wins**: the initial value and options of a namespace
//!   are fixed by whoever requests it first.
//! - **Failures stay at the edge**: a failed persistence write or broadcast
//!   never stops observers from being notified. Write failures surface
//!   through [`Store::last_error`].
//! - **No self echo**: every store has an [`InstanceId`]; envelopes it
//!   published itself are ignored when they come back.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sharedstore::persist::MemoryPersistence;
//! use sharedstore::{observer, Registry, StoreOptions};
//!
//! let registry = Registry::default()
//!     .with_sync_persistence(Arc::new(MemoryPersistence::new()));
//!
//! let form = registry
//!     .get_or_create("form", 1, StoreOptions::persisted())
//!     .unwrap();
//! form.subscribe(observer(|v: &i32| println!("form is now {v}")));
//! form.set_state(5);
//! ```
//!
//! ## Re-exports
//!
//! - `sharedstore::core` - Namespaces, envelopes, options
//! - `sharedstore::persist` - Persistence traits and backends
//! - `sharedstore::broadcast` - Channels, the in-process hub, debounce

pub mod binding;
pub mod config;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod store;

// Re-export component crates
pub use sharedstore_broadcast as broadcast;
pub use sharedstore_core as core;
pub use sharedstore_persist as persist;

pub use binding::{Binding, ChangeEvent, Setter};
pub use config::{Capabilities, RegistryConfig};
pub use error::{Result, StoreError};
pub use persistence::Persistence;
pub use registry::Registry;
pub use store::{observer, Observer, Store};

pub use sharedstore_core::{InstanceId, Namespace, SetOptions, StoreOptions, StoreValue};
