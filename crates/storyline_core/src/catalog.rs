//! Catalog write path: story writes followed by aggregate updates.
//!
//! The story document is written first, the aggregate second. There is no
//! transaction spanning both; if the second write fails the aggregate drifts
//! until the next rebuild.

use crate::error::{CoreError, CoreResult};
use crate::story_store::StoryStore;
use crate::version::{ContentVersion, VersionRepository};
use std::sync::Arc;
use storyline_protocol::Story;
use tracing::{info, warn};

/// Mutations on the catalog that keep the aggregate in step.
#[derive(Clone)]
pub struct Catalog {
    stories: StoryStore,
    versions: Arc<dyn VersionRepository>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("stories", &self.stories)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Creates a catalog over a story store and a version repository.
    pub fn new(stories: StoryStore, versions: Arc<dyn VersionRepository>) -> Self {
        Self { stories, versions }
    }

    /// Returns the story store.
    pub fn stories(&self) -> &StoryStore {
        &self.stories
    }

    /// Returns the version repository.
    pub fn versions(&self) -> &Arc<dyn VersionRepository> {
        &self.versions
    }

    /// Saves a story and records its checksum.
    ///
    /// Available stories get their checksum set in the aggregate; unavailable
    /// stories are removed from it.
    ///
    /// # Errors
    ///
    /// Returns a validation or store error. A failure after the story write
    /// leaves the aggregate stale.
    pub fn save_story(&self, story: Story) -> CoreResult<Story> {
        let saved = self.stories.put(story)?;
        let aggregate = self.record(&saved)?;
        info!(
            story_id = %saved.id,
            story_version = saved.version,
            content_version = aggregate.version,
            available = saved.available,
            "story saved"
        );
        Ok(saved)
    }

    /// Deletes a story and removes its checksum. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn delete_story(&self, id: &str) -> CoreResult<bool> {
        let existed = self.stories.delete(id)?;
        let aggregate = self
            .versions
            .remove_story_checksum(id)
            .inspect_err(|e| warn!(story_id = id, error = %e, "aggregate update failed after delete"))?;
        info!(
            story_id = id,
            existed,
            content_version = aggregate.version,
            "story deleted"
        );
        Ok(existed)
    }

    /// Changes a story's availability.
    ///
    /// # Errors
    ///
    /// Returns `StoryNotFound` for an unknown story or a store error.
    pub fn set_availability(&self, id: &str, available: bool) -> CoreResult<Story> {
        let story = self
            .stories
            .get(id)?
            .ok_or_else(|| CoreError::StoryNotFound(id.to_string()))?;
        self.save_story(story.with_available(available))
    }

    /// Records a download. The aggregate is not touched.
    ///
    /// # Errors
    ///
    /// Returns `StoryNotFound` for an unknown story or a store error.
    pub fn record_download(&self, id: &str) -> CoreResult<u64> {
        self.stories.increment_download_count(id)
    }

    fn record(&self, story: &Story) -> CoreResult<ContentVersion> {
        let result = if story.available {
            self.versions
                .apply_story_checksum_change(&story.id, &story.checksum)
        } else {
            self.versions.remove_story_checksum(&story.id)
        };
        result.inspect_err(|e| {
            warn!(story_id = %story.id, error = %e, "aggregate update failed after story write");
        })
    }
}
