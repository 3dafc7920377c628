//! # Storyline Core
//!
//! Content versioning and delta-sync reconciliation for a story catalog.
//!
//! This crate provides:
//! - [`story_checksum`], a deterministic content digest
//! - [`StoryStore`], typed access to story documents
//! - [`ContentVersion`] and [`VersionRepository`], the catalog-wide aggregate
//! - [`AssetVersion`] and [`AssetVersionRepository`], the same for media assets
//! - [`Catalog`], the write path keeping stories and aggregate in step
//! - [`Reconciler`], which answers delta-sync and version-check requests
//! - [`RepairService`], which rebuilds and verifies the aggregate
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use storyline_core::{ContentEngine, CoreConfig};
//! use storyline_protocol::{DeltaSyncRequest, Story, StoryPage};
//! use storyline_store::InMemoryDocumentStore;
//!
//! let engine = ContentEngine::new(Arc::new(InMemoryDocumentStore::new()), CoreConfig::default());
//! engine
//!     .catalog()
//!     .save_story(Story::new("moon-bear", "Moon Bear", "bedtime")
//!         .with_page(StoryPage::new(1, "cover", "Moon Bear")))
//!     .unwrap();
//!
//! let response = engine.reconciler().reconcile(&DeltaSyncRequest::initial()).unwrap();
//! assert_eq!(response.stories.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod checksum;
mod config;
mod error;
mod rebuild;
mod reconciler;
mod story_store;
mod version;

pub use catalog::Catalog;
pub use checksum::{checksum_matches, story_checksum};
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use rebuild::{DriftReport, RebuildReport, RepairService};
pub use reconciler::Reconciler;
pub use story_store::{
    Pagination, ScanCursor, ScanPage, StoryFilter, StoryStats, StoryStore, STORIES_COLLECTION,
};
pub use version::{
    AssetVersion, AssetVersionRepository, ContentVersion, DocumentAssetVersionRepository,
    DocumentVersionRepository, VersionRepository, ASSET_VERSIONS_COLLECTION,
    CONTENT_VERSIONS_COLLECTION, CURRENT_VERSION_ID,
};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use storyline_store::DocumentStore;

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// All core services wired over one document store.
#[derive(Clone)]
pub struct ContentEngine {
    catalog: Catalog,
    reconciler: Reconciler,
    repair: RepairService,
    assets: Arc<dyn AssetVersionRepository>,
}

impl std::fmt::Debug for ContentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEngine")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl ContentEngine {
    /// Wires the services with a document-backed version repository.
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        let versions: Arc<dyn VersionRepository> =
            Arc::new(DocumentVersionRepository::new(store.clone()));
        Self::with_versions(store, versions, config)
    }

    /// Wires the services with a caller-supplied version repository.
    pub fn with_versions(
        store: Arc<dyn DocumentStore>,
        versions: Arc<dyn VersionRepository>,
        config: CoreConfig,
    ) -> Self {
        let assets: Arc<dyn AssetVersionRepository> =
            Arc::new(DocumentAssetVersionRepository::new(store.clone()));
        let stories = StoryStore::new(store, config);
        Self {
            catalog: Catalog::new(stories.clone(), versions.clone()),
            reconciler: Reconciler::new(stories.clone(), versions.clone()),
            repair: RepairService::new(stories, versions),
            assets,
        }
    }

    /// Replaces the asset version repository.
    #[must_use]
    pub fn with_asset_versions(mut self, assets: Arc<dyn AssetVersionRepository>) -> Self {
        self.assets = assets;
        self
    }

    /// Returns the write path.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the story store.
    pub fn stories(&self) -> &StoryStore {
        self.catalog.stories()
    }

    /// Returns the version repository.
    pub fn versions(&self) -> &Arc<dyn VersionRepository> {
        self.catalog.versions()
    }

    /// Returns the asset version repository.
    pub fn asset_versions(&self) -> &Arc<dyn AssetVersionRepository> {
        &self.assets
    }

    /// Returns the reconciler.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Returns the repair service.
    pub fn repair(&self) -> &RepairService {
        &self.repair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_store::FileDocumentStore;
    use tempfile::tempdir;

    #[test]
    fn engine_over_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let checksums = {
            let store = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
            let engine = ContentEngine::new(store, CoreConfig::default());
            for id in ["a", "b"] {
                engine
                    .catalog()
                    .save_story(storyline_protocol::Story::new(id, id, "c"))
                    .unwrap();
            }
            engine.versions().get_current().unwrap().unwrap()
        };

        let store = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
        let engine = ContentEngine::new(store, CoreConfig::default());
        assert_eq!(engine.versions().get_current().unwrap(), Some(checksums));
        assert!(engine.repair().verify().unwrap().is_consistent());
    }

    #[test]
    fn asset_aggregate_shares_the_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
        let engine = ContentEngine::new(store, CoreConfig::default());
        engine
            .asset_versions()
            .apply_asset_checksum_change("images/a.png", "c1", None)
            .unwrap();
        drop(engine);

        let store = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
        let engine = ContentEngine::new(store, CoreConfig::default());
        let assets = engine.asset_versions().get_current().unwrap().unwrap();
        assert_eq!(assets.total_assets, 1);
        assert_eq!(engine.versions().get_current().unwrap(), None);
    }
}
