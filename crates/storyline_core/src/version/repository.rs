//! Persistence of the content and asset version aggregates.

use super::{AssetVersion, ContentVersion};
use crate::error::{CoreError, CoreResult};
use crate::now_millis;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use storyline_store::DocumentStore;
use tracing::debug;

/// Collection holding the aggregate record.
pub const CONTENT_VERSIONS_COLLECTION: &str = "content_versions";

/// Collection holding the asset aggregate record.
pub const ASSET_VERSIONS_COLLECTION: &str = "asset_versions";

/// ID of the single aggregate record in each collection.
pub const CURRENT_VERSION_ID: &str = "current";

fn load_record<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> CoreResult<Option<T>> {
    store
        .get(collection, CURRENT_VERSION_ID)?
        .map(|doc| {
            serde_json::from_value(doc)
                .map_err(|e| CoreError::corrupt_document(collection, CURRENT_VERSION_ID, e))
        })
        .transpose()
}

fn store_record<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    record: &T,
) -> CoreResult<()> {
    let document = serde_json::to_value(record)
        .map_err(|e| CoreError::corrupt_document(collection, CURRENT_VERSION_ID, e))?;
    store.set(collection, CURRENT_VERSION_ID, document)?;
    Ok(())
}

/// Loads and stores the content version aggregate.
///
/// The patch operations are read-modify-write without concurrency control:
/// two writers racing on the aggregate may lose one update. A rebuild
/// restores the map from story content.
pub trait VersionRepository: Send + Sync {
    /// Loads the aggregate, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn get_current(&self) -> CoreResult<Option<ContentVersion>>;

    /// Overwrites the aggregate in one write.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    fn replace(&self, aggregate: &ContentVersion) -> CoreResult<()>;

    /// Sets one story's checksum and bumps the version.
    ///
    /// Nothing is written when the entry already holds `checksum`.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn apply_story_checksum_change(
        &self,
        story_id: &str,
        checksum: &str,
    ) -> CoreResult<ContentVersion> {
        let mut aggregate = self.get_current()?.unwrap_or_default();
        if aggregate.apply(story_id, checksum, now_millis()) {
            self.replace(&aggregate)?;
            debug!(
                story_id,
                version = aggregate.version,
                total_stories = aggregate.total_stories,
                "story checksum applied"
            );
        }
        Ok(aggregate)
    }

    /// Removes one story's entry and bumps the version.
    ///
    /// Nothing is written when the entry is absent.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn remove_story_checksum(&self, story_id: &str) -> CoreResult<ContentVersion> {
        let mut aggregate = self.get_current()?.unwrap_or_default();
        if aggregate.remove(story_id, now_millis()) {
            self.replace(&aggregate)?;
            debug!(
                story_id,
                version = aggregate.version,
                total_stories = aggregate.total_stories,
                "story checksum removed"
            );
        }
        Ok(aggregate)
    }
}

/// Stores the aggregate as `content_versions/current` in a document store.
#[derive(Clone)]
pub struct DocumentVersionRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for DocumentVersionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentVersionRepository").finish_non_exhaustive()
    }
}

impl DocumentVersionRepository {
    /// Creates a repository over a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl VersionRepository for DocumentVersionRepository {
    fn get_current(&self) -> CoreResult<Option<ContentVersion>> {
        load_record(self.store.as_ref(), CONTENT_VERSIONS_COLLECTION)
    }

    fn replace(&self, aggregate: &ContentVersion) -> CoreResult<()> {
        store_record(self.store.as_ref(), CONTENT_VERSIONS_COLLECTION, aggregate)
    }
}

/// Loads and stores the asset version aggregate.
///
/// Same read-modify-write contract as [`VersionRepository`].
pub trait AssetVersionRepository: Send + Sync {
    /// Loads the aggregate, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn get_current(&self) -> CoreResult<Option<AssetVersion>>;

    /// Overwrites the aggregate in one write.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    fn replace(&self, aggregate: &AssetVersion) -> CoreResult<()>;

    /// Records one asset's checksum (and size) and bumps the version.
    ///
    /// Nothing is written when the entry is unchanged.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn apply_asset_checksum_change(
        &self,
        path: &str,
        checksum: &str,
        size_bytes: Option<u64>,
    ) -> CoreResult<AssetVersion> {
        let mut aggregate = self.get_current()?.unwrap_or_default();
        if aggregate.apply(path, checksum, size_bytes, now_millis()) {
            self.replace(&aggregate)?;
            debug!(
                path,
                version = aggregate.version,
                total_assets = aggregate.total_assets,
                "asset checksum applied"
            );
        }
        Ok(aggregate)
    }

    /// Removes one asset and bumps the version.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    fn remove_asset_checksum(&self, path: &str) -> CoreResult<AssetVersion> {
        let mut aggregate = self.get_current()?.unwrap_or_default();
        if aggregate.remove(path, now_millis()) {
            self.replace(&aggregate)?;
            debug!(
                path,
                version = aggregate.version,
                total_assets = aggregate.total_assets,
                "asset checksum removed"
            );
        }
        Ok(aggregate)
    }
}

/// Stores the asset aggregate as `asset_versions/current`.
#[derive(Clone)]
pub struct DocumentAssetVersionRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for DocumentAssetVersionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAssetVersionRepository")
            .finish_non_exhaustive()
    }
}

impl DocumentAssetVersionRepository {
    /// Creates a repository over a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl AssetVersionRepository for DocumentAssetVersionRepository {
    fn get_current(&self) -> CoreResult<Option<AssetVersion>> {
        load_record(self.store.as_ref(), ASSET_VERSIONS_COLLECTION)
    }

    fn replace(&self, aggregate: &AssetVersion) -> CoreResult<()> {
        store_record(self.store.as_ref(), ASSET_VERSIONS_COLLECTION, aggregate)
    }
}
