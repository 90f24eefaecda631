//! # sharedstore persist
//!
//! Persistence capability for sharedstore. Stores mirror their value into a
//! key-value backend keyed by `prefix + namespace`, JSON encoded.
//!
//! ## Key Types
//!
//! - [`SyncPersistence`] - Synchronous backend; failures are returned as errors
//! - [`AsyncPersistence`] - Asynchronous backend; `set` resolves to the stored value
//! - [`MemoryPersistence`] - In-memory backend with optional byte quota
//! - [`SqlitePersistence`] - Durable SQLite backend
//! - [`Blocking`] - Async adapter over any sync backend
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sharedstore_persist::{Blocking, SqlitePersistence, SyncPersistence};
//!
//! let backend = SqlitePersistence::open("state.db").unwrap();
//! backend.set("!store::counter", "2").unwrap();
//!
//! // The same backend, asynchronous shape.
//! let backend = Blocking::new(SqlitePersistence::open("state.db").unwrap());
//! ```

pub mod blocking;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use blocking::Blocking;
pub use error::{PersistError, Result};
pub use memory::MemoryPersistence;
pub use sqlite::SqlitePersistence;
pub use traits::{AsyncPersistence, SyncPersistence};
