//! Import command implementation.

use serde::Deserialize;
use std::path::Path;
use storyline_core::ContentEngine;
use storyline_protocol::Story;
use tracing::info;

/// Accepted layouts of an import file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<Story>),
    Wrapped { stories: Vec<Story> },
}

/// Import result.
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Stories whose content changed.
    pub written: usize,
    /// Stories that already held identical content.
    pub unchanged: usize,
    /// Stories that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Runs the import command.
pub fn run(path: &Path, file: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing stories from {:?} into {:?}", file, path);
    let stories = read_stories(file)?;
    println!("Importing {} stories from {:?}", stories.len(), file);

    if dry_run {
        let mut invalid = 0;
        for story in &stories {
            let mut story = story.clone();
            story.sort_pages();
            if let Err(e) = story.validate() {
                println!("  ✗ {}: {}", story.id, e);
                invalid += 1;
            }
        }
        println!();
        println!("Dry run: {} valid, {} invalid", stories.len() - invalid, invalid);
        return Ok(());
    }

    let engine = super::open_engine(path)?;
    let result = import(&engine, stories);

    for (id, reason) in &result.failed {
        println!("  ✗ {}: {}", id, reason);
    }
    println!();
    println!("Written:   {}", result.written);
    println!("Unchanged: {}", result.unchanged);
    println!("Failed:    {}", result.failed.len());

    if result.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} stories failed to import", result.failed.len()).into())
    }
}

/// Parses an import file.
pub fn read_stories(file: &Path) -> Result<Vec<Story>, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    Ok(match serde_json::from_slice(&bytes)? {
        ImportFile::List(stories) => stories,
        ImportFile::Wrapped { stories } => stories,
    })
}

/// Saves stories through the catalog so the aggregate follows.
pub fn import(engine: &ContentEngine, stories: Vec<Story>) -> ImportResult {
    let mut result = ImportResult::default();
    for story in stories {
        let id = story.id.clone();
        let before = engine.stories().get(&id).ok().flatten().map(|s| s.checksum);
        match engine.catalog().save_story(story) {
            Ok(saved) if before.as_deref() == Some(saved.checksum.as_str()) => {
                result.unchanged += 1;
            }
            Ok(_) => result.written += 1,
            Err(e) => result.failed.push((id, e.to_string())),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use storyline_testkit::{sample_catalog, TestCatalog};

    #[test]
    fn reads_both_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let stories = sample_catalog(2);

        let list = dir.path().join("list.json");
        std::fs::write(&list, serde_json::to_vec(&stories).unwrap()).unwrap();
        assert_eq!(read_stories(&list).unwrap().len(), 2);

        let wrapped = dir.path().join("wrapped.json");
        let mut f = std::fs::File::create(&wrapped).unwrap();
        write!(f, "{}", serde_json::json!({ "stories": stories })).unwrap();
        assert_eq!(read_stories(&wrapped).unwrap().len(), 2);
    }

    #[test]
    fn import_counts_outcomes() {
        let catalog = TestCatalog::memory();
        let mut stories = sample_catalog(3);
        stories[2].id.clear();

        let first = import(&catalog, stories.clone());
        assert_eq!(first.written, 2);
        assert_eq!(first.failed.len(), 1);

        let again = import(&catalog, stories[..2].to_vec());
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.written, 0);
        assert_eq!(catalog.client_checksums().len(), 2);
    }
}
