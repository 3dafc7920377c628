//! The content version aggregate.
//!
//! A single record summarizing the catalog: a monotonic version, the number
//! of available stories and the checksum of each. Clients compare their own
//! checksum map against it to find out what changed.
//!
//! [`AssetVersion`] does the same for media assets, keyed by asset path.

mod asset;
mod repository;

pub use asset::AssetVersion;
pub use repository::{
    AssetVersionRepository, DocumentAssetVersionRepository, DocumentVersionRepository,
    VersionRepository, ASSET_VERSIONS_COLLECTION, CONTENT_VERSIONS_COLLECTION,
    CURRENT_VERSION_ID,
};

use serde::{Deserialize, Serialize};
use storyline_protocol::ChecksumMap;

/// The catalog-wide version record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentVersion {
    /// Monotonic version, bumped on every change.
    pub version: u64,
    /// Number of entries in `story_checksums`.
    pub total_stories: u64,
    /// Time of the last change (epoch ms).
    pub last_updated: u64,
    /// Story ID to content checksum, available stories only.
    pub story_checksums: ChecksumMap,
}

impl ContentVersion {
    /// The state of a catalog that has never been written.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a record from a complete checksum map.
    #[must_use]
    pub fn from_checksums(version: u64, last_updated: u64, story_checksums: ChecksumMap) -> Self {
        Self {
            version,
            total_stories: story_checksums.len() as u64,
            last_updated,
            story_checksums,
        }
    }

    /// Sets one story's checksum. Returns false, changing nothing, if the
    /// entry already holds that checksum.
    pub fn apply(&mut self, story_id: &str, checksum: &str, now: u64) -> bool {
        if self.story_checksums.get(story_id).map(String::as_str) == Some(checksum) {
            return false;
        }
        self.story_checksums
            .insert(story_id.to_string(), checksum.to_string());
        self.touch(now);
        true
    }

    /// Removes one story's entry. Returns false, changing nothing, if absent.
    pub fn remove(&mut self, story_id: &str, now: u64) -> bool {
        if self.story_checksums.remove(story_id).is_none() {
            return false;
        }
        self.touch(now);
        true
    }

    /// IDs whose server checksum the client lacks or holds differently.
    ///
    /// Returned in ID order. Entries only the client has are ignored.
    pub fn diff(&self, client: &ChecksumMap) -> Vec<String> {
        diff_checksums(&self.story_checksums, client)
    }

    fn touch(&mut self, now: u64) {
        self.version += 1;
        self.total_stories = self.story_checksums.len() as u64;
        self.last_updated = now.max(self.last_updated);
    }
}

/// Keys of `server` that `client` lacks or maps to a different checksum.
pub(crate) fn diff_checksums(server: &ChecksumMap, client: &ChecksumMap) -> Vec<String> {
    server
        .iter()
        .filter(|(key, checksum)| client.get(*key) != Some(*checksum))
        .map(|(key, _)| key.clone())
        .collect()
}
