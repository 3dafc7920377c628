//! Rebuild command implementation.

use std::path::Path;
use tracing::info;

/// Runs the rebuild command.
///
/// With `dry_run` the aggregate is only compared, as `verify` does.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Rebuilding content version for {:?}", path);
    let engine = super::open_existing(path)?;

    if dry_run {
        let drift = engine.repair().verify()?;
        println!("Dry run: no changes made");
        println!("  Would add:    {}", drift.missing.len());
        println!("  Would change: {}", drift.stale.len());
        println!("  Would remove: {}", drift.orphaned.len());
        return Ok(());
    }

    let report = engine.repair().rebuild()?;
    println!(
        "Rebuilt content version {} -> {}",
        report.previous_version, report.version
    );
    println!("  Scanned:  {}", report.scanned);
    println!("  Stories:  {}", report.total_stories);
    println!("  Added:    {}", report.added);
    println!("  Changed:  {}", report.changed);
    println!("  Removed:  {}", report.removed);
    if report.stale_story_checksums > 0 {
        println!(
            "  {} story documents carry an outdated checksum field",
            report.stale_story_checksums
        );
    }
    if report.was_consistent() {
        println!("✓ Aggregate was already consistent");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_testkit::{sample_catalog, sample_story};

    #[test]
    fn rebuild_repairs_file_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog");
        {
            let engine = crate::commands::open_engine(&path).unwrap();
            for story in sample_catalog(3) {
                engine.catalog().save_story(story).unwrap();
            }
            engine.stories().put(sample_story("story-extra")).unwrap();
        }

        run(&path, true).unwrap();
        run(&path, false).unwrap();

        let engine = crate::commands::open_existing(&path).unwrap();
        assert!(engine.repair().verify().unwrap().is_consistent());
        let aggregate = engine.versions().get_current().unwrap().unwrap();
        assert_eq!(aggregate.version, 4);
        assert_eq!(aggregate.total_stories, 4);
    }
}
