//! Property-based test generators using proptest.
//!
//! Generated stories always pass `Story::validate`.

use proptest::prelude::*;
use storyline_protocol::{ChecksumMap, InteractiveElement, Position, Size, Story, StoryPage};

/// Strategy for story IDs.
pub fn story_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for category names.
pub fn category_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["adventure", "bedtime", "animals", "learning", "music"])
        .prop_map(str::to_string)
}

/// Strategy for an in-range coordinate.
pub fn geometry_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=100.0
}

/// Strategy for interactive elements with in-range geometry.
pub fn element_strategy() -> impl Strategy<Value = InteractiveElement> {
    (
        "[a-z]{1,8}",
        prop::sample::select(vec!["tap", "drag", "sound"]),
        geometry_strategy(),
        geometry_strategy(),
        geometry_strategy(),
        geometry_strategy(),
    )
        .prop_map(|(id, kind, x, y, width, height)| InteractiveElement {
            id,
            element_type: kind.to_string(),
            position: Position { x, y },
            size: Size { width, height },
            ..InteractiveElement::default()
        })
}

/// Strategy for a page with the given number.
pub fn page_strategy(page_number: u32) -> impl Strategy<Value = StoryPage> {
    (
        "[A-Za-z ]{0,40}",
        prop::collection::vec(element_strategy(), 0..3),
    )
        .prop_map(move |(text, elements)| {
            let mut page = StoryPage::new(page_number, "content", text);
            page.interactive_elements = elements;
            page
        })
}

/// Strategy for valid stories with the given ID.
///
/// Pages are numbered 1..=n and shuffled.
pub fn story_with_id_strategy(id: String) -> impl Strategy<Value = Story> {
    (
        "[A-Za-z ]{1,30}",
        category_strategy(),
        prop::collection::vec("[a-z]{1,6}", 0..4),
        1u32..6,
        any::<bool>(),
    )
        .prop_flat_map(move |(title, category, tags, page_count, available)| {
            let id = id.clone();
            let pages: Vec<_> = (1..=page_count).map(page_strategy).collect();
            pages.prop_shuffle().prop_map(move |pages| {
                let mut story =
                    Story::new(id.clone(), title.clone(), category.clone()).with_available(available);
                story.tags = tags.clone();
                story.pages = pages;
                story
            })
        })
}

/// Strategy for valid stories.
pub fn story_strategy() -> impl Strategy<Value = Story> {
    story_id_strategy().prop_flat_map(story_with_id_strategy)
}

/// Strategy for a small catalog of stories with distinct IDs.
pub fn catalog_strategy(max_len: usize) -> impl Strategy<Value = Vec<Story>> {
    prop::collection::btree_set(story_id_strategy(), 0..=max_len).prop_flat_map(|ids| {
        ids.into_iter()
            .map(story_with_id_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for checksum maps as a client might send them.
pub fn checksum_map_strategy(max_len: usize) -> impl Strategy<Value = ChecksumMap> {
    prop::collection::btree_map(story_id_strategy(), "[0-9a-f]{64}", 0..=max_len)
}

/// Strategy for asset paths that pass validation under the default prefixes.
pub fn safe_asset_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["stories/", "audio/", "images/", "thumbnails/"]),
        prop::collection::vec("[a-z0-9_-]{1,10}", 1..4),
        prop::sample::select(vec!["webp", "png", "mp3"]),
    )
        .prop_map(|(prefix, segments, ext)| format!("{prefix}{}.{ext}", segments.join("/")))
}

/// Strategy for asset paths that must be rejected.
pub fn unsafe_asset_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        safe_asset_path_strategy().prop_map(|p| format!("/{p}")),
        safe_asset_path_strategy().prop_map(|p| format!("../{p}")),
        safe_asset_path_strategy().prop_map(|p| p.replacen('/', "/../", 1)),
        safe_asset_path_strategy().prop_map(|p| format!("{p}%00.txt")),
        (
            safe_asset_path_strategy(),
            prop::sample::select(vec!["%2e%2e", "%2e.", ".%2E", "%252e%252e", "..%2f"]),
        )
            .prop_map(|(p, dots)| p.replacen('/', &format!("/{dots}/"), 1)),
        "[a-z]{1,8}/[a-z]{1,8}".prop_map(|p| format!("private-{p}")),
    ]
}
