//! # Storyline Store
//!
//! Document store trait and implementations for Storyline.
//!
//! This crate is the lowest-level persistence abstraction. Stores hold
//! schema-free JSON documents keyed by `(collection, id)` and answer simple
//! filter/order/cursor queries. They know nothing about stories or versions.
//!
//! ## Design Principles
//!
//! - Single-document operations only, no multi-document transactions
//! - "In" clauses are bounded by [`DocumentStore::max_in_query`]
//! - Must be `Send + Sync` for concurrent access
//! - An unreachable backend surfaces as [`StoreError::Unavailable`]
//!
//! ## Available Stores
//!
//! - [`InMemoryDocumentStore`] - For testing, with outage simulation
//! - [`FileDocumentStore`] - JSON files in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use storyline_store::{DocumentStore, InMemoryDocumentStore, Query};
//! use serde_json::json;
//!
//! let store = InMemoryDocumentStore::new();
//! store.set("stories", "s1", json!({"category": "bedtime"})).unwrap();
//! let hits = store
//!     .query("stories", &Query::new().where_eq("category", "bedtime"))
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod query;

pub use backend::{DocumentStore, DEFAULT_MAX_IN_QUERY};
pub use error::{StoreError, StoreResult};
pub use file::FileDocumentStore;
pub use memory::{InMemoryDocumentStore, StoreStats};
pub use query::{compare_values, Cursor, Direction, Document, Filter, Query};
