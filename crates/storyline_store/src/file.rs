//! File-based document store for local persistent catalogs.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ stories.json      # One JSON object per collection: { id: document }
//! └─ content_versions.json
//! ```

use crate::backend::{merge_fields, DocumentStore, DEFAULT_MAX_IN_QUERY};
use crate::error::{StoreError, StoreResult};
use crate::query::{execute, Document, Query};
use fs2::FileExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const COLLECTION_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// A document store persisted as one JSON file per collection.
///
/// The whole store is held in memory and every write rewrites the affected
/// collection file with a write-then-rename, so a crash leaves either the old
/// or the new file on disk.
///
/// # Thread Safety
///
/// The store holds an exclusive lock on its directory. Only one
/// `FileDocumentStore` can exist per directory at a time, across processes.
///
/// # Example
///
/// ```no_run
/// use storyline_store::{DocumentStore, FileDocumentStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileDocumentStore::open(Path::new("catalog")).unwrap();
/// store.set("stories", "s1", json!({"title": "Moon Bear"})).unwrap();
/// ```
#[derive(Debug)]
pub struct FileDocumentStore {
    path: PathBuf,
    collections: RwLock<Collections>,
    max_in_query: usize,
    _lock_file: File,
}

impl FileDocumentStore {
    /// Opens or creates a store directory and loads every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists and is not a directory
    /// - Another process holds the lock (returns `Locked`)
    /// - A collection file cannot be parsed (returns `Corrupted`)
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StoreError::InvalidCollection(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let collections = load_collections(path)?;
        debug!(
            path = %path.display(),
            collections = collections.len(),
            "opened file document store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            collections: RwLock::new(collections),
            max_in_query: DEFAULT_MAX_IN_QUERY,
            _lock_file: lock_file,
        })
    }

    /// Sets the "in" clause limit.
    #[must_use]
    pub fn with_max_in_query(mut self, max_in_query: usize) -> Self {
        self.max_in_query = max_in_query.max(1);
        self
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.{COLLECTION_EXT}"))
    }

    /// Writes one collection with write-then-rename.
    fn persist(&self, collection: &str, docs: &BTreeMap<String, Document>) -> StoreResult<()> {
        let final_path = self.collection_path(collection);
        let temp_path = self.path.join(format!("{collection}.{TEMP_EXT}"));

        let data = serde_json::to_vec_pretty(docs)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    /// Applies a mutation to one collection and persists it.
    ///
    /// The in-memory state is only replaced once the file write succeeded.
    fn mutate<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut BTreeMap<String, Document>) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        validate_collection(collection)?;
        let mut collections = self.collections.write();
        let mut docs = collections.get(collection).cloned().unwrap_or_default();
        let (result, changed) = f(&mut docs)?;
        if changed {
            self.persist(collection, &docs)?;
            collections.insert(collection.to_string(), docs);
        }
        Ok(result)
    }
}

impl DocumentStore for FileDocumentStore {
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        if !document.is_object() {
            return Err(StoreError::InvalidDocument(format!(
                "{collection}/{id} is not a JSON object"
            )));
        }
        self.mutate(collection, |docs| {
            docs.insert(id.to_string(), document);
            Ok(((), true))
        })
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Document> {
        self.mutate(collection, |docs| {
            let document = docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            if !merge_fields(document, fields) {
                return Err(StoreError::InvalidDocument(format!(
                    "{collection}/{id} is not a JSON object"
                )));
            }
            Ok((document.clone(), true))
        })
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.mutate(collection, |docs| {
            let existed = docs.remove(id).is_some();
            Ok((existed, existed))
        })
    }

    fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<(String, Document)>> {
        validate_collection(collection)?;
        query.check_in_limit(self.max_in_query)?;
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

/// Collection names become file names, so only a safe alphabet is allowed.
fn validate_collection(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name != LOCK_FILE
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

fn load_collections(path: &Path) -> StoreResult<Collections> {
    let mut collections = Collections::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_path = entry.path();
        if file_path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXT) {
            continue;
        }
        let Some(name) = file_path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if validate_collection(name).is_err() {
            continue;
        }

        let data = fs::read(&file_path)?;
        let docs: BTreeMap<String, Document> = serde_json::from_slice(&data).map_err(|e| {
            StoreError::Corrupted(format!("{}: {e}", file_path.display()))
        })?;
        if let Some((id, _)) = docs.iter().find(|(_, doc)| !doc.is_object()) {
            return Err(StoreError::Corrupted(format!(
                "{name}/{id} is not a JSON object"
            )));
        }
        collections.insert(name.to_string(), docs);
    }
    Ok(collections)
}
