//! The asset version aggregate.

use super::diff_checksums;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storyline_protocol::ChecksumMap;

/// The catalog-wide record of media assets.
///
/// Mirrors [`ContentVersion`](super::ContentVersion) with asset paths as
/// keys. Sizes are optional per asset; `total_size_bytes` sums the known
/// ones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetVersion {
    /// Monotonic version, bumped on every change.
    pub version: u64,
    /// Number of entries in `asset_checksums`.
    pub total_assets: u64,
    /// Sum of the known asset sizes.
    pub total_size_bytes: u64,
    /// Time of the last change (epoch ms).
    pub last_updated: u64,
    /// Asset path to content checksum.
    pub asset_checksums: ChecksumMap,
    /// Asset path to size in bytes, where known.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub asset_sizes: BTreeMap<String, u64>,
}

impl AssetVersion {
    /// Records one asset. Returns false, changing nothing, if the entry
    /// already holds that checksum and size.
    pub fn apply(&mut self, path: &str, checksum: &str, size_bytes: Option<u64>, now: u64) -> bool {
        let same_checksum = self.asset_checksums.get(path).map(String::as_str) == Some(checksum);
        if same_checksum && self.asset_sizes.get(path).copied() == size_bytes {
            return false;
        }
        self.asset_checksums
            .insert(path.to_string(), checksum.to_string());
        match size_bytes {
            Some(size) => self.asset_sizes.insert(path.to_string(), size),
            None => self.asset_sizes.remove(path),
        };
        self.touch(now);
        true
    }

    /// Removes one asset. Returns false, changing nothing, if absent.
    pub fn remove(&mut self, path: &str, now: u64) -> bool {
        if self.asset_checksums.remove(path).is_none() {
            return false;
        }
        self.asset_sizes.remove(path);
        self.touch(now);
        true
    }

    /// Paths whose server checksum the client lacks or holds differently,
    /// in path order.
    pub fn diff(&self, client: &ChecksumMap) -> Vec<String> {
        diff_checksums(&self.asset_checksums, client)
    }

    /// Size of one asset, if known.
    pub fn size_of(&self, path: &str) -> Option<u64> {
        self.asset_sizes.get(path).copied()
    }

    fn touch(&mut self, now: u64) {
        self.version += 1;
        self.total_assets = self.asset_checksums.len() as u64;
        self.total_size_bytes = self.asset_sizes.values().sum();
        self.last_updated = now.max(self.last_updated);
    }
}
