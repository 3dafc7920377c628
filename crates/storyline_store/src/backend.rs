//! Document store trait definition.

use crate::error::StoreResult;
use crate::query::{Document, Query};
use serde_json::{Map, Value};

/// Default number of values a backend accepts in one "in" clause.
pub const DEFAULT_MAX_IN_QUERY: usize = 10;

/// A key-addressed document collection store.
///
/// Backends are **schema-free**. They store JSON objects under
/// `(collection, id)` and answer field-equality/range queries. They offer no
/// multi-document transactions: every call is an independent operation and
/// concurrent writers to the same document are last-writer-wins.
///
/// # Invariants
///
/// - `set` replaces the whole document atomically; readers observe either
///   the old or the new document
/// - `get` on a missing document returns `Ok(None)`
/// - `query` rejects "in" clauses larger than [`DocumentStore::max_in_query`]
/// - An unreachable backend reports [`crate::StoreError::Unavailable`]
///
/// # Implementors
///
/// - [`super::InMemoryDocumentStore`] - For testing
/// - [`super::FileDocumentStore`] - For local persistent storage
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Creates or replaces one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object or the write fails.
    fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()>;

    /// Merges top-level fields into an existing document and returns the result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist.
    fn update(&self, collection: &str, id: &str, fields: Map<String, Value>)
        -> StoreResult<Document>;

    /// Deletes one document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Runs a query over one collection.
    ///
    /// # Errors
    ///
    /// Returns `InQueryTooLarge` if an "in" clause exceeds the backend limit,
    /// or `InvalidQuery` for an unusable cursor.
    fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<(String, Document)>>;

    /// Maximum number of values accepted by one "in" clause.
    fn max_in_query(&self) -> usize {
        DEFAULT_MAX_IN_QUERY
    }
}

/// Merges `fields` into `document`, which must be an object.
pub(crate) fn merge_fields(document: &mut Document, fields: Map<String, Value>) -> bool {
    match document.as_object_mut() {
        Some(object) => {
            object.extend(fields);
            true
        }
        None => false,
    }
}
