//! Story content types.
//!
//! These are the documents stored in the `stories` collection and shipped to
//! clients in sync responses. Field names are camelCase on the wire.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound of the geometry space. Normalized `[0,1]` values fit too.
pub const MAX_GEOMETRY: f64 = 100.0;

/// A story in the catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Story {
    /// Stable unique identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Category used for browsing.
    pub category: String,
    /// Display tag (badge text).
    pub tag: String,
    /// Display emoji.
    pub emoji: String,
    /// Filtering tags.
    pub tags: Vec<String>,
    /// Cover image asset path.
    pub cover_image: String,
    /// Whether the story is offered to clients.
    #[serde(rename = "isAvailable")]
    pub available: bool,
    /// Target age range, e.g. "3-5".
    pub age_range: String,
    /// Reading time in minutes.
    pub duration: u32,
    /// Short description.
    pub description: String,
    /// Monotonic per-story version, bumped on every write.
    pub version: u64,
    /// Content checksum, recomputed on every write.
    pub checksum: String,
    /// Pages in `page_number` order.
    pub pages: Vec<StoryPage>,
    /// Creation time (epoch ms).
    pub created_at: u64,
    /// Last write time (epoch ms).
    pub updated_at: u64,
    /// Download counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u64>,
    /// Average rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

/// One page of a story.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoryPage {
    /// Page identifier.
    pub id: String,
    /// 1-based position. Gaps are allowed, duplicates are not.
    pub page_number: u32,
    /// Page kind: cover, story, ending, or anything newer clients know.
    #[serde(rename = "type")]
    pub page_type: String,
    /// Narration text.
    pub text: String,
    /// Translations keyed by language code.
    pub localized_text: BTreeMap<String, String>,
    /// Background image asset path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    /// Character image asset path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_image: Option<String>,
    /// Narration audio asset path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Tappable elements in draw order.
    pub interactive_elements: Vec<InteractiveElement>,
}

/// A tappable element on a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractiveElement {
    /// Element identifier.
    pub id: String,
    /// Element kind.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Image asset path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Anchor position.
    pub position: Position,
    /// Rendered size.
    pub size: Size,
    /// Touch area, defaults to the rendered bounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_area: Option<HitArea>,
    /// Free-form element data (animation, sound cues).
    pub data: BTreeMap<String, Value>,
}

/// A point in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// A size in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// A rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitArea {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Story {
    /// Creates an available story with the given identity and no pages.
    pub fn new(id: impl Into<String>, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: category.into(),
            available: true,
            ..Self::default()
        }
    }

    /// Appends a page.
    #[must_use]
    pub fn with_page(mut self, page: StoryPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Sets availability.
    #[must_use]
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Sorts pages by page number.
    pub fn sort_pages(&mut self) {
        self.pages.sort_by_key(|p| p.page_number);
    }

    /// Checks structural rules: non-empty ID, page numbers unique and
    /// 1-based, geometry finite and inside `[0, MAX_GEOMETRY]`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStory` naming the first rule broken.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProtocolError::invalid_story(&self.id, "id is empty"));
        }

        let mut numbers = BTreeSet::new();
        for page in &self.pages {
            if page.page_number == 0 {
                return Err(ProtocolError::invalid_story(
                    &self.id,
                    format!("page {:?} has page number 0", page.id),
                ));
            }
            if !numbers.insert(page.page_number) {
                return Err(ProtocolError::invalid_story(
                    &self.id,
                    format!("duplicate page number {}", page.page_number),
                ));
            }
            for element in &page.interactive_elements {
                element.validate().map_err(|reason| {
                    ProtocolError::invalid_story(
                        &self.id,
                        format!(
                            "page {} element {:?}: {reason}",
                            page.page_number, element.id
                        ),
                    )
                })?;
            }
        }
        Ok(())
    }
}

impl StoryPage {
    /// Creates a page with text.
    pub fn new(page_number: u32, page_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: format!("page-{page_number}"),
            page_number,
            page_type: page_type.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Appends an interactive element.
    #[must_use]
    pub fn with_element(mut self, element: InteractiveElement) -> Self {
        self.interactive_elements.push(element);
        self
    }
}

impl InteractiveElement {
    fn validate(&self) -> Result<(), String> {
        let mut values = vec![
            ("position.x", self.position.x),
            ("position.y", self.position.y),
            ("size.width", self.size.width),
            ("size.height", self.size.height),
        ];
        if let Some(hit) = &self.hit_area {
            values.extend([
                ("hitArea.x", hit.x),
                ("hitArea.y", hit.y),
                ("hitArea.width", hit.width),
                ("hitArea.height", hit.height),
            ]);
        }
        for (name, value) in values {
            if !value.is_finite() {
                return Err(format!("{name} is not finite"));
            }
            if !(0.0..=MAX_GEOMETRY).contains(&value) {
                return Err(format!("{name} = {value} is outside [0, {MAX_GEOMETRY}]"));
            }
        }
        Ok(())
    }
}
