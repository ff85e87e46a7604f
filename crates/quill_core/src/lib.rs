//! # Quill Core
//!
//! Embeddable single-process document database engine.
//!
//! Documents are JSON-like [`Value`]s stored in an append-only log and
//! served from in-memory indexes. This crate provides:
//! - The [`DataStore`] facade (insert / find / update / remove /
//!   ensure_index) and its [`Cursor`] query pipeline
//! - Secondary indexes with unique / sparse / TTL constraints and
//!   multi-index transactional rollback
//! - MongoDB-flavoured query matching and update operators
//! - Crash-safe log compaction and integrity recovery on load
//! - The executor that linearises every operation against the indexes
//!   and the log
//!
//! ## Example
//!
//! ```rust
//! use quill_core::{DataStore, Value};
//!
//! let db = DataStore::open_in_memory().unwrap();
//! db.insert(Value::object(vec![
//!     ("artist", "Hendrix".into()),
//!     ("title", "Hey Joe".into()),
//! ]))
//! .unwrap();
//!
//! let hits = db
//!     .find(Value::object(vec![("artist", "Hendrix".into())]))
//!     .exec()
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod datastore;
mod error;
mod events;
mod executor;
mod id;
mod index;
mod options;
mod persistence;
mod query;
mod record;

pub use cursor::{Cursor, QueryResults};
pub use datastore::{DataStore, UpdateOptions, UpdateOutcome};
pub use error::{CoreError, CoreResult};
pub use events::DbEvent;
pub use index::IndexOptions;
pub use options::DataStoreOptions;
pub use persistence::SerializationHook;
pub use quill_codec::{StringComparator, Value};
