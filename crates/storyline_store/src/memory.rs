//! In-memory document store for testing.

use crate::backend::{merge_fields, DocumentStore, DEFAULT_MAX_IN_QUERY};
use crate::error::{StoreError, StoreResult};
use crate::query::{execute, Document, Query};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Operation counters recorded by [`InMemoryDocumentStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Single-document reads.
    pub reads: u64,
    /// Document writes (set, update, delete).
    pub writes: u64,
    /// Queries executed.
    pub queries: u64,
    /// Largest "in" clause seen by a successful query.
    pub largest_in_query: usize,
}

/// An in-memory document store.
///
/// This store keeps every collection in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral catalogs that don't need persistence
///
/// It can simulate an outage with [`InMemoryDocumentStore::set_available`],
/// after which every operation fails with `Unavailable`.
///
/// # Example
///
/// ```rust
/// use storyline_store::{DocumentStore, InMemoryDocumentStore};
/// use serde_json::json;
///
/// let store = InMemoryDocumentStore::new();
/// store.set("stories", "s1", json!({"title": "Moon Bear"})).unwrap();
/// assert!(store.get("stories", "s1").unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    available: AtomicBool,
    max_in_query: usize,
    reads: AtomicU64,
    writes: AtomicU64,
    queries: AtomicU64,
    largest_in_query: AtomicUsize,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::with_max_in_query(DEFAULT_MAX_IN_QUERY)
    }
}

impl InMemoryDocumentStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a custom "in" clause limit.
    #[must_use]
    pub fn with_max_in_query(max_in_query: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            max_in_query: max_in_query.max(1),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            largest_in_query: AtomicUsize::new(0),
        }
    }

    /// Simulates the backend going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the operation counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            largest_in_query: self.largest_in_query.load(Ordering::Relaxed),
        }
    }

    /// Resets the operation counters.
    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        self.largest_in_query.store(0, Ordering::Relaxed);
    }

    /// Returns the number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store is offline"))
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.ensure_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        self.ensure_available()?;
        if !document.is_object() {
            return Err(StoreError::InvalidDocument(format!(
                "{collection}/{id} is not a JSON object"
            )));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Document> {
        self.ensure_available()?;
        let mut collections = self.collections.write();
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        if !merge_fields(document, fields) {
            return Err(StoreError::InvalidDocument(format!(
                "{collection}/{id} is not a JSON object"
            )));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(document.clone())
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.ensure_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<(String, Document)>> {
        self.ensure_available()?;
        query.check_in_limit(self.max_in_query)?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.largest_in_query
            .fetch_max(query.in_query_size(), Ordering::Relaxed);

        let collections = self.collections.read();
        match collections.get(collection) {
            Some(docs) => execute(docs, query),
            None => Ok(Vec::new()),
        }
    }

    fn max_in_query(&self) -> usize {
        self.max_in_query
    }
}
