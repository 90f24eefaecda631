//! # sharedstore testkit
//!
//! Testing utilities for sharedstore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Persistence and broadcast doubles that record calls, fail
//!   on demand or hold writes in flight until the test resolves them
//! - **Generators**: Proptest strategies for namespaces, envelopes and
//!   mutation sequences
//!
//! ## Out-of-order writes
//!
//! ```rust,ignore
//! use sharedstore_testkit::fixtures::{GatedPersistence, WriteOutcome};
//!
//! let gated = Arc::new(GatedPersistence::new());
//! // ... two set_state calls on a store backed by `gated` ...
//! gated.wait_for_pending(2).await;
//! gated.resolve_newest(WriteOutcome::Commit);
//! gated.resolve_oldest(WriteOutcome::Reject("quota".into()));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sharedstore_testkit::generators::{ops, StoreOp};
//!
//! proptest! {
//!     #[test]
//!     fn store_tracks_model(ops in ops(32)) {
//!         // apply each op to a store and to an i64 model, compare
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    GatedPersistence, PersistCall, Probe, ProbePersistence, RecordingBroadcaster,
    RecordingChannel, WriteOutcome,
};
pub use generators::{ops, StoreOp};
