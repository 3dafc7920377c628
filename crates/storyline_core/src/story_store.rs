//! Story Store: typed CRUD and query façade over the `stories` collection.
//!
//! The store is the only writer of story documents. Every `put` normalizes
//! page order, validates, bumps the per-story version and recomputes the
//! checksum before the document reaches the backend.

use crate::checksum::story_checksum;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::now_millis;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use storyline_protocol::Story;
use storyline_store::{Direction, Document, DocumentStore, Query};
use tracing::debug;

/// Collection holding story documents.
pub const STORIES_COLLECTION: &str = "stories";

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryFilter {
    /// Only stories in this category.
    pub category: Option<String>,
    /// Only stories with this availability.
    pub available: Option<bool>,
}

impl StoryFilter {
    /// Matches every story.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restricts to an availability.
    #[must_use]
    pub fn available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page index, starting at 0.
    pub page: usize,
    /// Page size. Clamped to the configured maximum; 0 means the default.
    pub size: usize,
}

impl Pagination {
    /// Creates a page request.
    #[must_use]
    pub const fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Position of an incremental scan: the last `(updatedAt, id)` returned.
///
/// Renders as `<updatedAt>:<id>` for callers that carry it as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    /// `updatedAt` of the last story returned, as it was when returned.
    pub updated_at: u64,
    /// ID of the last story returned.
    pub id: String,
}

impl ScanCursor {
    /// Creates a cursor.
    pub fn new(updated_at: u64, id: impl Into<String>) -> Self {
        Self {
            updated_at,
            id: id.into(),
        }
    }

    /// Parses the `<updatedAt>:<id>` form.
    pub fn parse(text: &str) -> Option<Self> {
        let (updated_at, id) = text.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        Some(Self::new(updated_at.parse().ok()?, id))
    }
}

impl std::fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.updated_at, self.id)
    }
}

/// One page of an incremental scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    /// Stories in `(updatedAt, id)` order.
    pub stories: Vec<Story>,
    /// Pass back to continue; `None` when the scan is complete.
    pub next_cursor: Option<ScanCursor>,
}

/// Catalog statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryStats {
    /// All stories.
    pub total: u64,
    /// Stories offered to clients.
    pub available: u64,
    /// Stories withheld from clients.
    pub unavailable: u64,
    /// Sum of download counters.
    pub total_downloads: u64,
    /// Mean of the ratings that are set.
    pub average_rating: Option<f64>,
    /// Category with the most downloads (ties: more stories, then name).
    pub most_popular_category: Option<String>,
}

/// Typed access to story documents.
#[derive(Clone)]
pub struct StoryStore {
    store: Arc<dyn DocumentStore>,
    config: CoreConfig,
}

impl std::fmt::Debug for StoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StoryStore {
    /// Creates a story store over a document backend.
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        Self { store, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Returns the underlying document store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Effective "in" query size.
    fn in_chunk(&self) -> usize {
        self.config
            .max_in_query
            .min(self.store.max_in_query())
            .max(1)
    }

    /// Reads one story. A missing story is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the document is corrupt.
    pub fn get(&self, id: &str) -> CoreResult<Option<Story>> {
        self.store
            .get(STORIES_COLLECTION, id)?
            .map(|doc| decode_story(id, doc))
            .transpose()
    }

    /// Lists stories matching a filter, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a document is corrupt.
    pub fn list(&self, filter: &StoryFilter, pagination: Pagination) -> CoreResult<Vec<Story>> {
        let size = match pagination.size {
            0 => self.config.default_page_size,
            n => n,
        }
        .min(self.config.max_page_size)
        .max(1);

        let query = filter_query(filter)
            .offset(pagination.page.saturating_mul(size))
            .limit(size);
        self.run(&query)
    }

    /// Lists every story in a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a document is corrupt.
    pub fn list_by_category(&self, category: &str) -> CoreResult<Vec<Story>> {
        self.run(&filter_query(&StoryFilter::all().category(category)))
    }

    /// Lists every available story.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a document is corrupt.
    pub fn list_available(&self) -> CoreResult<Vec<Story>> {
        self.run(&filter_query(&StoryFilter::all().available(true)))
    }

    /// Fetches stories by ID in request order.
    ///
    /// IDs are split into "in" queries no larger than the store accepts.
    /// Unknown IDs are dropped, duplicates appear once.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails; no partial result is returned.
    pub fn list_by_ids(&self, ids: &[String]) -> CoreResult<Vec<Story>> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.in_chunk();
        let mut found: HashMap<String, Story> = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(chunk_size) {
            let query = Query::new().where_id_in(chunk.to_vec());
            for (id, doc) in self.store.query(STORIES_COLLECTION, &query)? {
                let story = decode_story(&id, doc)?;
                found.insert(id, story);
            }
        }
        debug!(
            requested = ids.len(),
            found = found.len(),
            chunks = unique.len().div_ceil(chunk_size),
            "fetched stories by id"
        );

        Ok(unique
            .iter()
            .filter_map(|id| found.remove(id))
            .collect())
    }

    /// Writes a story and returns what was stored.
    ///
    /// Pages are sorted, the story is validated, `version` becomes the stored
    /// version plus one, `updatedAt` is stamped, `createdAt` is kept from the
    /// stored document (or stamped on first write) and `checksum` is
    /// recomputed. Volatile counters are kept from the stored document when
    /// the caller leaves them unset.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for invalid content or a store error.
    pub fn put(&self, mut story: Story) -> CoreResult<Story> {
        story.sort_pages();
        story.validate()?;

        let previous = self.get(&story.id)?;
        let now = now_millis();
        match &previous {
            Some(prev) => {
                story.version = prev.version + 1;
                story.created_at = prev.created_at;
                if story.download_count.is_none() {
                    story.download_count = prev.download_count;
                }
                if story.rating.is_none() {
                    story.rating = prev.rating;
                }
            }
            None => {
                story.version = 1;
                story.created_at = now;
            }
        }
        story.updated_at = now.max(story.created_at);
        story.checksum = story_checksum(&story);

        let document = story_document(&story)?;
        self.store.set(STORIES_COLLECTION, &story.id, document)?;
        debug!(story_id = %story.id, version = story.version, "story written");
        Ok(story)
    }

    /// Deletes a story. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn delete(&self, id: &str) -> CoreResult<bool> {
        Ok(self.store.delete(STORIES_COLLECTION, id)?)
    }

    /// Adds one to the download counter. Content, version and checksum are
    /// untouched. Concurrent increments may be lost.
    ///
    /// # Errors
    ///
    /// Returns `StoryNotFound` for an unknown story or a store error.
    pub fn increment_download_count(&self, id: &str) -> CoreResult<u64> {
        let story = self
            .get(id)?
            .ok_or_else(|| CoreError::StoryNotFound(id.to_string()))?;
        let count = story.download_count.unwrap_or(0) + 1;

        let mut fields = Map::new();
        fields.insert("downloadCount".into(), json!(count));
        self.store.update(STORIES_COLLECTION, id, fields)?;
        Ok(count)
    }

    /// Returns stories written after `timestamp`, in `(updatedAt, id)` order.
    ///
    /// The cursor is positional: a story edited after it was returned shows
    /// up again later in the scan, and no other story is skipped.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    pub fn scan_updated_after(
        &self,
        timestamp: u64,
        limit: usize,
        cursor: Option<&ScanCursor>,
    ) -> CoreResult<ScanPage> {
        let limit = limit.clamp(1, self.config.max_page_size);
        let mut query = Query::new()
            .where_gt("updatedAt", timestamp)
            .order_by("updatedAt", Direction::Ascending)
            .limit(limit + 1);
        if let Some(cursor) = cursor {
            query = query.start_after_row(cursor.updated_at, cursor.id.as_str());
        }
        self.page(&query, limit)
    }

    /// Visits every story in ID order, `scan_batch_size` documents at a time.
    ///
    /// # Errors
    ///
    /// Returns the first store, decode or visitor error.
    pub fn scan_all<F>(&self, mut visit: F) -> CoreResult<u64>
    where
        F: FnMut(Story) -> CoreResult<()>,
    {
        let batch = self.config.scan_batch_size.max(1);
        let mut cursor: Option<String> = None;
        let mut visited = 0u64;
        loop {
            let mut query = Query::new().limit(batch + 1);
            if let Some(c) = &cursor {
                query = query.start_after(c.clone());
            }
            let page = self.page(&query, batch)?;
            for story in page.stories {
                visit(story)?;
                visited += 1;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next.id),
                None => return Ok(visited),
            }
        }
    }

    /// Computes catalog statistics with a full scan.
    ///
    /// # Errors
    ///
    /// Returns a store or decode error.
    pub fn stats(&self) -> CoreResult<StoryStats> {
        let mut stats = StoryStats::default();
        let mut rating_sum = 0.0;
        let mut rating_count = 0u64;
        // category -> (downloads, stories)
        let mut categories: BTreeMap<String, (u64, u64)> = BTreeMap::new();

        self.scan_all(|story| {
            stats.total += 1;
            if story.available {
                stats.available += 1;
            } else {
                stats.unavailable += 1;
            }
            let downloads = story.download_count.unwrap_or(0);
            stats.total_downloads += downloads;
            if let Some(rating) = story.rating.filter(|r| r.is_finite()) {
                rating_sum += rating;
                rating_count += 1;
            }
            let entry = categories.entry(story.category).or_default();
            entry.0 += downloads;
            entry.1 += 1;
            Ok(())
        })?;

        if rating_count > 0 {
            stats.average_rating = Some(rating_sum / rating_count as f64);
        }
        stats.most_popular_category = categories
            .into_iter()
            .max_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| b_name.cmp(a_name)))
            .map(|(name, _)| name);
        Ok(stats)
    }

    fn run(&self, query: &Query) -> CoreResult<Vec<Story>> {
        self.store
            .query(STORIES_COLLECTION, query)?
            .into_iter()
            .map(|(id, doc)| decode_story(&id, doc))
            .collect()
    }

    /// Runs a query fetched with `limit + 1` and splits off the cursor.
    fn page(&self, query: &Query, limit: usize) -> CoreResult<ScanPage> {
        let mut stories = self.run(query)?;
        let next_cursor = if stories.len() > limit {
            stories.truncate(limit);
            stories
                .last()
                .map(|s| ScanCursor::new(s.updated_at, s.id.as_str()))
        } else {
            None
        };
        Ok(ScanPage {
            stories,
            next_cursor,
        })
    }
}

fn filter_query(filter: &StoryFilter) -> Query {
    let mut query = Query::new();
    if let Some(category) = &filter.category {
        query = query.where_eq("category", category.as_str());
    }
    if let Some(available) = filter.available {
        query = query.where_eq("isAvailable", available);
    }
    query
}

/// Decodes a story document. The document key is authoritative for the ID.
pub(crate) fn decode_story(id: &str, doc: Document) -> CoreResult<Story> {
    let mut story: Story = serde_json::from_value(doc)
        .map_err(|e| CoreError::corrupt_document(STORIES_COLLECTION, id, e))?;
    if story.id.is_empty() {
        story.id = id.to_string();
    }
    Ok(story)
}

/// Encodes a story as a stored document.
pub(crate) fn story_document(story: &Story) -> CoreResult<Value> {
    serde_json::to_value(story)
        .map_err(|e| CoreError::corrupt_document(STORIES_COLLECTION, &story.id, e))
}
