//! Test fixtures and catalog helpers.
//!
//! Provides sample stories and ready-made engines over in-memory or
//! temporary file stores.

use std::path::Path;
use std::sync::Arc;
use storyline_core::{ContentEngine, CoreConfig};
use storyline_protocol::{
    ChecksumMap, HitArea, InteractiveElement, Position, Size, Story, StoryPage,
};
use storyline_store::{FileDocumentStore, InMemoryDocumentStore};
use tempfile::TempDir;

/// Categories used by [`sample_catalog`], in rotation.
pub const SAMPLE_CATEGORIES: [&str; 4] = ["adventure", "bedtime", "animals", "learning"];

/// Builds a complete, valid story with three pages.
///
/// The pages are deliberately out of order; storing the story sorts them.
pub fn sample_story(id: &str) -> Story {
    let mut story = Story::new(id, format!("The Tale of {id}"), SAMPLE_CATEGORIES[0])
        .with_page(StoryPage::new(3, "ending", "And they all slept soundly."))
        .with_page(StoryPage::new(1, "cover", format!("The Tale of {id}")))
        .with_page(
            StoryPage::new(2, "content", "Tap the moon to wake it up.").with_element(
                InteractiveElement {
                    id: "moon".into(),
                    element_type: "tap".into(),
                    image: Some(format!("images/{id}/moon.png")),
                    position: Position { x: 40.0, y: 20.0 },
                    size: Size {
                        width: 20.0,
                        height: 20.0,
                    },
                    hit_area: Some(HitArea {
                        x: 35.0,
                        y: 15.0,
                        width: 30.0,
                        height: 30.0,
                    }),
                    ..InteractiveElement::default()
                },
            ),
        );
    story.tag = "new".into();
    story.emoji = "🌙".into();
    story.tags = vec!["moon".into(), "night".into()];
    story.cover_image = format!("stories/{id}/cover.webp");
    story.age_range = "3-6".into();
    story.duration = 5;
    story.description = format!("A short story about {id}.");
    for page in &mut story.pages {
        page.background_image = Some(format!("stories/{id}/page-{}.webp", page.page_number));
        page.audio_url = Some(format!("audio/{id}/page-{}.mp3", page.page_number));
        page.localized_text
            .insert("es".into(), format!("Página {}", page.page_number));
    }
    story
}

/// Builds `count` sample stories with IDs `story-001`, `story-002`, ...
/// spread across [`SAMPLE_CATEGORIES`].
pub fn sample_catalog(count: usize) -> Vec<Story> {
    (0..count)
        .map(|i| {
            let mut story = sample_story(&format!("story-{:03}", i + 1));
            story.category = SAMPLE_CATEGORIES[i % SAMPLE_CATEGORIES.len()].to_string();
            story
        })
        .collect()
}

/// A content engine over a throwaway store.
pub struct TestCatalog {
    /// The engine under test.
    pub engine: ContentEngine,
    memory: Option<Arc<InMemoryDocumentStore>>,
    temp_dir: Option<TempDir>,
}

impl TestCatalog {
    /// Creates an empty in-memory catalog.
    pub fn memory() -> Self {
        Self::memory_with_config(CoreConfig::default())
    }

    /// Creates an empty in-memory catalog with a custom configuration.
    pub fn memory_with_config(config: CoreConfig) -> Self {
        let backend = Arc::new(InMemoryDocumentStore::new());
        Self {
            engine: ContentEngine::new(backend.clone(), config),
            memory: Some(backend),
            temp_dir: None,
        }
    }

    /// Creates an empty catalog persisted under a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FileDocumentStore::open(&temp_dir.path().join("store"))
            .expect("Failed to open file store");
        Self {
            engine: ContentEngine::new(Arc::new(backend), CoreConfig::default()),
            memory: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory catalog holding [`sample_catalog`]`(count)`,
    /// saved through the catalog so the aggregate is consistent.
    pub fn seeded(count: usize) -> Self {
        let catalog = Self::memory();
        catalog.save_all(sample_catalog(count));
        catalog
    }

    /// Saves stories through the catalog, panicking on failure.
    pub fn save_all(&self, stories: impl IntoIterator<Item = Story>) -> Vec<Story> {
        stories
            .into_iter()
            .map(|story| {
                self.engine
                    .catalog()
                    .save_story(story)
                    .expect("Failed to save story")
            })
            .collect()
    }

    /// The in-memory backend, if this catalog uses one.
    pub fn backend(&self) -> Option<&Arc<InMemoryDocumentStore>> {
        self.memory.as_ref()
    }

    /// Simulates a store outage (in-memory catalogs only).
    pub fn set_store_available(&self, available: bool) {
        self.memory
            .as_ref()
            .expect("Outages can only be simulated on in-memory catalogs")
            .set_available(available);
    }

    /// The checksum map a fully synced client would hold.
    pub fn client_checksums(&self) -> ChecksumMap {
        self.engine
            .versions()
            .get_current()
            .expect("Failed to read aggregate")
            .map(|v| v.story_checksums)
            .unwrap_or_default()
    }

    /// Returns the store directory for file-backed catalogs.
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }
}

impl std::ops::Deref for TestCatalog {
    type Target = ContentEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary in-memory catalog.
pub fn with_test_catalog<F, R>(f: F) -> R
where
    F: FnOnce(&TestCatalog) -> R,
{
    let catalog = TestCatalog::memory();
    f(&catalog)
}

/// Runs a test with a temporary file-backed catalog and its store path.
pub fn with_file_catalog<F, R>(f: F) -> R
where
    F: FnOnce(&TestCatalog, &Path) -> R,
{
    let catalog = TestCatalog::file();
    let path = catalog.path().expect("File catalog should have a path");
    f(&catalog, &path)
}
