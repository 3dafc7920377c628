//! Rebuild and verification of the content version aggregate.
//!
//! `rebuild` recomputes the checksum map from story content and replaces
//! the aggregate in one write. `verify` compares the two and reports drift
//! without correcting it.

use crate::checksum::story_checksum;
use crate::error::CoreResult;
use crate::now_millis;
use crate::story_store::StoryStore;
use crate::version::{ContentVersion, VersionRepository};
use std::sync::Arc;
use std::time::Instant;
use storyline_protocol::ChecksumMap;
use tracing::{info, warn};

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Aggregate version before the rebuild (0 if absent).
    pub previous_version: u64,
    /// Aggregate version written.
    pub version: u64,
    /// Story documents scanned.
    pub scanned: u64,
    /// Available stories in the new map.
    pub total_stories: u64,
    /// Entries the old map lacked.
    pub added: u64,
    /// Entries whose checksum changed.
    pub changed: u64,
    /// Entries dropped from the old map.
    pub removed: u64,
    /// Story documents whose own `checksum` field is stale.
    pub stale_story_checksums: u64,
}

impl RebuildReport {
    /// Returns true if the old map already matched story content.
    pub fn was_consistent(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.removed == 0
    }
}

/// Differences between the aggregate and story content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Aggregate version inspected (0 if absent).
    pub version: u64,
    /// Available stories with no aggregate entry.
    pub missing: Vec<String>,
    /// Entries whose checksum does not match story content.
    pub stale: Vec<String>,
    /// Entries for stories that are gone or unavailable.
    pub orphaned: Vec<String>,
    /// Story documents whose own `checksum` field is stale.
    pub stale_story_checksums: Vec<String>,
    /// `totalStories` disagrees with the map size.
    pub count_mismatch: bool,
}

impl DriftReport {
    /// Returns true if nothing drifted.
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
            && self.stale.is_empty()
            && self.orphaned.is_empty()
            && self.stale_story_checksums.is_empty()
            && !self.count_mismatch
    }
}

/// Operator-triggered consistency tooling.
#[derive(Clone)]
pub struct RepairService {
    stories: StoryStore,
    versions: Arc<dyn VersionRepository>,
}

impl std::fmt::Debug for RepairService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairService").finish_non_exhaustive()
    }
}

/// Checksums computed from a full scan.
struct Scan {
    scanned: u64,
    /// Available stories only.
    computed: ChecksumMap,
    stale_story_checksums: Vec<String>,
}

impl RepairService {
    /// Creates a repair service.
    pub fn new(stories: StoryStore, versions: Arc<dyn VersionRepository>) -> Self {
        Self { stories, versions }
    }

    /// Recomputes the aggregate from story content.
    ///
    /// The new map holds a freshly computed checksum for every available
    /// story. It replaces the old aggregate in a single write with version
    /// previous + 1. Story documents are not rewritten.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error; the aggregate is then untouched.
    pub fn rebuild(&self) -> CoreResult<RebuildReport> {
        let started = Instant::now();
        let previous = self.versions.get_current()?.unwrap_or_default();
        let scan = self.scan()?;

        let mut report = RebuildReport {
            previous_version: previous.version,
            version: previous.version + 1,
            scanned: scan.scanned,
            total_stories: scan.computed.len() as u64,
            stale_story_checksums: scan.stale_story_checksums.len() as u64,
            ..RebuildReport::default()
        };
        for (id, checksum) in &scan.computed {
            match previous.story_checksums.get(id) {
                None => report.added += 1,
                Some(old) if old != checksum => report.changed += 1,
                Some(_) => {}
            }
        }
        report.removed = previous
            .story_checksums
            .keys()
            .filter(|id| !scan.computed.contains_key(*id))
            .count() as u64;

        let aggregate = ContentVersion::from_checksums(
            report.version,
            now_millis().max(previous.last_updated),
            scan.computed,
        );
        self.versions.replace(&aggregate)?;

        info!(
            version = report.version,
            scanned = report.scanned,
            total_stories = report.total_stories,
            added = report.added,
            changed = report.changed,
            removed = report.removed,
            stale_story_checksums = report.stale_story_checksums,
            duration_ms = started.elapsed().as_millis() as u64,
            "content version rebuilt"
        );
        Ok(report)
    }

    /// Compares the aggregate with story content. Corrects nothing.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    pub fn verify(&self) -> CoreResult<DriftReport> {
        let aggregate = self.versions.get_current()?.unwrap_or_default();
        let scan = self.scan()?;

        let mut report = DriftReport {
            version: aggregate.version,
            count_mismatch: aggregate.total_stories != aggregate.story_checksums.len() as u64,
            stale_story_checksums: scan.stale_story_checksums,
            ..DriftReport::default()
        };
        for (id, checksum) in &scan.computed {
            match aggregate.story_checksums.get(id) {
                None => report.missing.push(id.clone()),
                Some(recorded) if recorded != checksum => report.stale.push(id.clone()),
                Some(_) => {}
            }
        }
        report.orphaned = aggregate
            .story_checksums
            .keys()
            .filter(|id| !scan.computed.contains_key(*id))
            .cloned()
            .collect();

        if report.is_consistent() {
            info!(version = report.version, "content version consistent");
        } else {
            warn!(
                version = report.version,
                missing = report.missing.len(),
                stale = report.stale.len(),
                orphaned = report.orphaned.len(),
                stale_story_checksums = report.stale_story_checksums.len(),
                count_mismatch = report.count_mismatch,
                "content version drift detected"
            );
        }
        Ok(report)
    }

    fn scan(&self) -> CoreResult<Scan> {
        let mut computed = ChecksumMap::new();
        let mut stale_story_checksums = Vec::new();
        let scanned = self.stories.scan_all(|story| {
            let checksum = story_checksum(&story);
            if story.checksum != checksum {
                stale_story_checksums.push(story.id.clone());
            }
            if story.available {
                computed.insert(story.id, checksum);
            }
            Ok(())
        })?;
        Ok(Scan {
            scanned,
            computed,
            stale_story_checksums,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::CoreConfig;
    use crate::story_store::{story_document, STORIES_COLLECTION};
    use crate::version::DocumentVersionRepository;
    use storyline_protocol::{Story, StoryPage};
    use storyline_store::{DocumentStore, InMemoryDocumentStore};

    struct Fixture {
        backend: Arc<InMemoryDocumentStore>,
        catalog: Catalog,
        repair: RepairService,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryDocumentStore::new());
        let stories = StoryStore::new(backend.clone(), CoreConfig::default().scan_batch_size(3));
        let versions: Arc<dyn VersionRepository> =
            Arc::new(DocumentVersionRepository::new(backend.clone()));
        Fixture {
            catalog: Catalog::new(stories.clone(), versions.clone()),
            repair: RepairService::new(stories, versions),
            backend,
        }
    }

    fn story(id: &str) -> Story {
        Story::new(id, id, "bedtime").with_page(StoryPage::new(1, "cover", id))
    }

    fn seed(f: &Fixture, n: usize) {
        for i in 0..n {
            f.catalog.save_story(story(&format!("s{i:02}"))).unwrap();
        }
    }

    #[test]
    fn consistent_catalog_verifies_clean() {
        let f = fixture();
        seed(&f, 7);
        let report = f.repair.verify().unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.version, 7);
    }

    #[test]
    fn rebuild_is_idempotent_on_map_content() {
        let f = fixture();
        seed(&f, 7);
        let before = f.catalog.versions().get_current().unwrap().unwrap();

        let first = f.repair.rebuild().unwrap();
        assert!(first.was_consistent());
        assert_eq!(first.version, before.version + 1);
        let after_first = f.catalog.versions().get_current().unwrap().unwrap();

        let second = f.repair.rebuild().unwrap();
        assert_eq!(second.version, first.version + 1);
        let after_second = f.catalog.versions().get_current().unwrap().unwrap();

        assert_eq!(after_first.story_checksums, before.story_checksums);
        assert_eq!(after_second.story_checksums, after_first.story_checksums);
        assert_eq!(after_second.total_stories, 7);
    }

    #[test]
    fn rebuild_on_empty_store() {
        let f = fixture();
        let report = f.repair.rebuild().unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(report.total_stories, 0);
        let cv = f.catalog.versions().get_current().unwrap().unwrap();
        assert!(cv.story_checksums.is_empty());
    }

    #[test]
    fn drift_is_reported_then_repaired() {
        let f = fixture();
        seed(&f, 5);

        // Lost update: story written, aggregate entry removed.
        let mut cv = f.catalog.versions().get_current().unwrap().unwrap();
        cv.story_checksums.remove("s00");
        // Stale entry.
        cv.story_checksums.insert("s01".into(), "bogus".into());
        // Orphan entry.
        cv.story_checksums.insert("ghost".into(), "x".into());
        f.catalog.versions().replace(&cv).unwrap();
        // Story hidden behind the aggregate's back.
        let hidden = f.catalog.stories().get("s02").unwrap().unwrap().with_available(false);
        f.backend
            .set(STORIES_COLLECTION, "s02", story_document(&hidden).unwrap())
            .unwrap();

        let drift = f.repair.verify().unwrap();
        assert_eq!(drift.missing, vec!["s00"]);
        assert_eq!(drift.stale, vec!["s01"]);
        assert_eq!(drift.orphaned, vec!["ghost", "s02"]);
        assert!(drift.stale_story_checksums.is_empty());
        // verify corrects nothing
        assert_eq!(f.catalog.versions().get_current().unwrap().unwrap(), cv);

        let report = f.repair.rebuild().unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.changed, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.total_stories, 4);

        assert!(f.repair.verify().unwrap().is_consistent());
    }

    #[test]
    fn stale_story_documents_are_counted() {
        let f = fixture();
        seed(&f, 2);
        let mut edited = f.catalog.stories().get("s00").unwrap().unwrap();
        edited.title = "Edited out of band".into();
        f.backend
            .set(STORIES_COLLECTION, "s00", story_document(&edited).unwrap())
            .unwrap();

        let drift = f.repair.verify().unwrap();
        assert_eq!(drift.stale_story_checksums, vec!["s00"]);
        assert_eq!(drift.stale, vec!["s00"]);

        let report = f.repair.rebuild().unwrap();
        assert_eq!(report.stale_story_checksums, 1);
        assert_eq!(report.changed, 1);
    }

    #[test]
    fn failed_rebuild_leaves_aggregate() {
        let f = fixture();
        seed(&f, 3);
        f.backend.set_available(false);
        assert!(f.repair.rebuild().unwrap_err().is_retryable());
        f.backend.set_available(true);
        assert_eq!(f.catalog.versions().get_current().unwrap().unwrap().version, 3);
    }
}
