//! Story content checksums.
//!
//! A checksum is SHA-256 over a canonical JSON rendering of the fields a
//! reader can see. Bookkeeping fields (`version`, `checksum`, timestamps,
//! `downloadCount`, `rating`) and availability are left out, so re-saving
//! unchanged content yields the same checksum.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use storyline_protocol::{InteractiveElement, Story, StoryPage};

/// Domain tag mixed into every digest. Bump it to invalidate all checksums.
const CHECKSUM_DOMAIN: &[u8] = b"storyline-story-v1\0";

/// Computes the content checksum of a story as lower-case hex.
///
/// Pages are hashed in `page_number` order and tags in sorted order, so the
/// result does not depend on how the story was assembled.
pub fn story_checksum(story: &Story) -> String {
    let canonical = canonical_content(story);
    let mut hasher = Sha256::new();
    hasher.update(CHECKSUM_DOMAIN);
    // Map keys are emitted sorted; serde_json's Map is ordered by key.
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns true if the stored checksum matches the story's content.
pub fn checksum_matches(story: &Story) -> bool {
    story.checksum == story_checksum(story)
}

fn canonical_content(story: &Story) -> Value {
    let mut tags = story.tags.clone();
    tags.sort();

    let mut pages: Vec<&StoryPage> = story.pages.iter().collect();
    pages.sort_by_key(|p| p.page_number);

    json!({
        "id": story.id,
        "title": story.title,
        "category": story.category,
        "tag": story.tag,
        "emoji": story.emoji,
        "tags": tags,
        "coverImage": story.cover_image,
        "ageRange": story.age_range,
        "duration": story.duration,
        "description": story.description,
        "pages": pages.into_iter().map(canonical_page).collect::<Vec<_>>(),
    })
}

fn canonical_page(page: &StoryPage) -> Value {
    json!({
        "id": page.id,
        "pageNumber": page.page_number,
        "type": page.page_type,
        "text": page.text,
        "localizedText": page.localized_text,
        "backgroundImage": page.background_image,
        "characterImage": page.character_image,
        "audioUrl": page.audio_url,
        "interactiveElements": page
            .interactive_elements
            .iter()
            .map(canonical_element)
            .collect::<Vec<_>>(),
    })
}

fn canonical_element(element: &InteractiveElement) -> Value {
    let hit_area = element.hit_area.map(|h| {
        json!({"x": h.x, "y": h.y, "width": h.width, "height": h.height})
    });
    let data: Map<String, Value> = element
        .data
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    json!({
        "id": element.id,
        "type": element.element_type,
        "image": element.image,
        "position": {"x": element.position.x, "y": element.position.y},
        "size": {"width": element.size.width, "height": element.size.height},
        "hitArea": hit_area,
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use storyline_protocol::{Position, Size};

    fn story() -> Story {
        Story::new("moon-bear", "Moon Bear", "bedtime")
            .with_page(StoryPage::new(1, "cover", "Moon Bear"))
            .with_page(StoryPage::new(2, "story", "The bear looked up."))
            .with_page(StoryPage::new(3, "ending", "Goodnight."))
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let sum = story_checksum(&story());
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn bookkeeping_fields_do_not_matter() {
        let base = story();
        let mut touched = base.clone();
        touched.version = 9;
        touched.checksum = "stale".into();
        touched.created_at = 1;
        touched.updated_at = 2;
        touched.download_count = Some(1000);
        touched.rating = Some(4.5);
        touched.available = false;
        assert_eq!(story_checksum(&base), story_checksum(&touched));
    }

    #[test]
    fn page_and_tag_order_do_not_matter() {
        let mut a = story();
        a.tags = vec!["sleep".into(), "animals".into()];
        let mut b = a.clone();
        b.pages.reverse();
        b.tags.reverse();
        assert_eq!(story_checksum(&a), story_checksum(&b));
    }

    #[test]
    fn content_changes_change_the_checksum() {
        let base = story_checksum(&story());

        let mut text = story();
        text.pages[1].text.push('!');
        assert_ne!(base, story_checksum(&text));

        let mut renumbered = story();
        renumbered.pages[2].page_number = 4;
        assert_ne!(base, story_checksum(&renumbered));

        let mut image = story();
        image.pages[0].background_image = Some("images/moon.webp".into());
        assert_ne!(base, story_checksum(&image));

        let mut element = story();
        element.pages[1].interactive_elements.push(InteractiveElement {
            id: "star".into(),
            element_type: "tap".into(),
            position: Position { x: 1.0, y: 2.0 },
            size: Size {
                width: 3.0,
                height: 4.0,
            },
            ..InteractiveElement::default()
        });
        assert_ne!(base, story_checksum(&element));
        let mut moved = element.clone();
        moved.pages[1].interactive_elements[0].position.x = 1.5;
        assert_ne!(story_checksum(&element), story_checksum(&moved));

        let mut localized = story();
        localized.pages[0]
            .localized_text
            .insert("es".into(), "Oso Luna".into());
        assert_ne!(base, story_checksum(&localized));
    }

    #[test]
    fn checksum_matches_detects_stale_values() {
        let mut s = story();
        assert!(!checksum_matches(&s));
        s.checksum = story_checksum(&s);
        assert!(checksum_matches(&s));
        s.title.push_str(" Returns");
        assert!(!checksum_matches(&s));
    }

    proptest! {
        #[test]
        fn checksum_is_stable_under_page_permutation(
            texts in proptest::collection::vec("[a-z ]{0,20}", 1..8),
            seed in any::<u64>(),
        ) {
            let mut s = Story::new("s", "t", "c");
            for (i, text) in texts.iter().enumerate() {
                s.pages.push(StoryPage::new(i as u32 + 1, "story", text.clone()));
            }
            let expected = story_checksum(&s);

            let len = s.pages.len();
            s.pages.rotate_left((seed as usize) % len);
            prop_assert_eq!(story_checksum(&s), expected.clone());
            s.pages.reverse();
            prop_assert_eq!(story_checksum(&s), expected);
        }
    }
}
