//! Delta-sync reconciliation.
//!
//! Given the checksums a client holds, work out which stories it must
//! download and ship their full content together with the complete current
//! checksum map. Reconciliation is read-only.

use crate::error::CoreResult;
use crate::story_store::StoryStore;
use crate::version::{ContentVersion, VersionRepository};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use storyline_protocol::{
    DeltaSyncRequest, DeltaSyncResponse, Story, VersionCheckRequest, VersionCheckResponse,
};
use tracing::{debug, warn};

/// Computes sync responses from the aggregate and the story store.
#[derive(Clone)]
pub struct Reconciler {
    stories: StoryStore,
    versions: Arc<dyn VersionRepository>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler.
    pub fn new(stories: StoryStore, versions: Arc<dyn VersionRepository>) -> Self {
        Self { stories, versions }
    }

    /// Builds the delta-sync response for a client.
    ///
    /// Stories are ordered by ID, so identical input against identical state
    /// yields an identical response. Stories deleted since the client's last
    /// sync are not reported; they simply vanish from `storyChecksums`.
    ///
    /// # Errors
    ///
    /// Returns a store error; nothing is partially returned.
    pub fn reconcile(&self, request: &DeltaSyncRequest) -> CoreResult<DeltaSyncResponse> {
        let started = Instant::now();
        let aggregate = self.current()?;
        let diff = aggregate.diff(&request.story_checksums);

        let stories = if diff.is_empty() {
            Vec::new()
        } else {
            self.fetch_changed(&aggregate, &diff)?
        };

        debug!(
            client_version = request.client_version,
            server_version = aggregate.version,
            client_entries = request.story_checksums.len(),
            diff = diff.len(),
            shipped = stories.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "delta sync reconciled"
        );

        Ok(DeltaSyncResponse {
            server_version: aggregate.version,
            total_stories: aggregate.total_stories,
            updated_stories: diff.len() as u64,
            last_updated: aggregate.last_updated,
            story_checksums: aggregate.story_checksums,
            stories,
        })
    }

    /// Reports the current aggregate and whether the client is up to date.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn check_version(&self, request: &VersionCheckRequest) -> CoreResult<VersionCheckResponse> {
        let aggregate = self.current()?;
        Ok(VersionCheckResponse {
            up_to_date: request.client_version == Some(aggregate.version),
            version: aggregate.version,
            total_stories: aggregate.total_stories,
            last_updated: aggregate.last_updated,
            story_checksums: aggregate.story_checksums,
        })
    }

    fn current(&self) -> CoreResult<ContentVersion> {
        Ok(self.versions.get_current()?.unwrap_or_default())
    }

    /// Fetches the diff set. Missing or unavailable stories are drift: they
    /// are logged and left out.
    fn fetch_changed(&self, aggregate: &ContentVersion, diff: &[String]) -> CoreResult<Vec<Story>> {
        let fetched = self.stories.list_by_ids(diff)?;
        let returned: HashSet<&str> = fetched.iter().map(|s| s.id.as_str()).collect();
        for id in diff.iter().filter(|id| !returned.contains(id.as_str())) {
            warn!(story_id = %id, "aggregate lists a story the store does not have");
        }

        let mut stories: Vec<Story> = fetched
            .into_iter()
            .filter(|story| {
                if !story.available {
                    warn!(story_id = %story.id, "aggregate lists an unavailable story");
                    return false;
                }
                if aggregate.story_checksums.get(&story.id) != Some(&story.checksum) {
                    warn!(story_id = %story.id, "aggregate checksum differs from stored story");
                }
                true
            })
            .collect();
        stories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::CoreConfig;
    use crate::story_store::{story_document, STORIES_COLLECTION};
    use crate::version::DocumentVersionRepository;
    use storyline_protocol::{ChecksumMap, StoryPage};
    use storyline_store::{DocumentStore, InMemoryDocumentStore};

    struct Fixture {
        backend: Arc<InMemoryDocumentStore>,
        catalog: Catalog,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryDocumentStore::new());
        let stories = StoryStore::new(backend.clone(), CoreConfig::default());
        let versions: Arc<dyn VersionRepository> =
            Arc::new(DocumentVersionRepository::new(backend.clone()));
        Fixture {
            catalog: Catalog::new(stories.clone(), versions.clone()),
            reconciler: Reconciler::new(stories, versions),
            backend,
        }
    }

    fn story(id: &str) -> Story {
        Story::new(id, id, "bedtime").with_page(StoryPage::new(1, "cover", id))
    }

    #[test]
    fn empty_catalog_yields_version_zero() {
        let f = fixture();
        let response = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();
        assert_eq!(response.server_version, 0);
        assert_eq!(response.updated_stories, 0);
        assert!(response.stories.is_empty());
        assert!(response.story_checksums.is_empty());
    }

    #[test]
    fn first_sync_ships_everything_in_id_order() {
        let f = fixture();
        for id in ["c", "a", "b"] {
            f.catalog.save_story(story(id)).unwrap();
        }
        let response = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();
        let ids: Vec<_> = response.stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(response.updated_stories, 3);
        assert_eq!(response.total_stories, 3);
        assert_eq!(response.server_version, 3);
    }

    #[test]
    fn up_to_date_client_gets_nothing_and_no_story_reads() {
        let f = fixture();
        f.catalog.save_story(story("a")).unwrap();
        let first = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();

        f.backend.reset_stats();
        let request = DeltaSyncRequest::new(first.server_version, first.story_checksums.clone());
        let second = f.reconciler.reconcile(&request).unwrap();
        assert!(second.is_empty());
        assert_eq!(second.updated_stories, 0);
        assert_eq!(second.story_checksums, first.story_checksums);
        assert_eq!(f.backend.stats().queries, 0);
    }

    #[test]
    fn stale_and_unknown_client_entries() {
        let f = fixture();
        f.catalog.save_story(story("a")).unwrap();
        f.catalog.save_story(story("b")).unwrap();

        let mut client = ChecksumMap::new();
        client.insert("a".into(), "old".into());
        client.insert("gone".into(), "x".into());
        let response = f.reconciler.reconcile(&DeltaSyncRequest::new(1, client)).unwrap();
        let ids: Vec<_> = response.stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!response.story_checksums.contains_key("gone"));
    }

    #[test]
    fn drifted_entries_are_skipped() {
        let f = fixture();
        f.catalog.save_story(story("a")).unwrap();
        f.catalog.save_story(story("b")).unwrap();
        // Story removed behind the catalog's back.
        f.backend.delete(STORIES_COLLECTION, "a").unwrap();
        // Story hidden without updating the aggregate.
        let hidden = f.catalog.stories().get("b").unwrap().unwrap().with_available(false);
        f.backend
            .set(STORIES_COLLECTION, "b", story_document(&hidden).unwrap())
            .unwrap();

        let response = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();
        assert!(response.stories.is_empty());
        assert_eq!(response.updated_stories, 2);
    }

    #[test]
    fn identical_requests_give_identical_bytes() {
        let f = fixture();
        for i in 0..12 {
            f.catalog.save_story(story(&format!("s{i}"))).unwrap();
        }
        let a = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();
        let b = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn version_check() {
        let f = fixture();
        f.catalog.save_story(story("a")).unwrap();
        let current = f
            .reconciler
            .check_version(&VersionCheckRequest { client_version: Some(1) })
            .unwrap();
        assert!(current.up_to_date);
        assert_eq!(current.total_stories, 1);

        let stale = f
            .reconciler
            .check_version(&VersionCheckRequest::default())
            .unwrap();
        assert!(!stale.up_to_date);
    }

    #[test]
    fn outage_is_retryable() {
        let f = fixture();
        f.backend.set_available(false);
        let err = f.reconciler.reconcile(&DeltaSyncRequest::initial()).unwrap_err();
        assert!(err.is_retryable());
    }
}
