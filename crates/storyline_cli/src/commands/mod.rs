//! CLI command implementations.

pub mod import;
pub mod inspect;
pub mod rebuild;
pub mod sign;
pub mod sync;
pub mod verify;

use std::path::Path;
use std::sync::Arc;
use storyline_core::{ContentEngine, CoreConfig};
use storyline_store::FileDocumentStore;

/// Opens the catalog store at `path`.
///
/// The store directory is created if missing; commands that only read
/// should check for existence first.
pub fn open_engine(path: &Path) -> Result<ContentEngine, Box<dyn std::error::Error>> {
    let store = FileDocumentStore::open(path)?;
    Ok(ContentEngine::new(Arc::new(store), CoreConfig::default()))
}

/// Like [`open_engine`] but fails if nothing exists at `path`.
pub fn open_existing(path: &Path) -> Result<ContentEngine, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No catalog found at {:?}", path).into());
    }
    open_engine(path)
}
