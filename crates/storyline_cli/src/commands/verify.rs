//! Verify command implementation.

use std::path::Path;
use storyline_core::DriftReport;
use tracing::info;

/// Runs the verify command.
///
/// Fails when the aggregate has drifted from story content.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Verifying content version for {:?}", path);
    let engine = super::open_existing(path)?;
    let report = engine.repair().verify()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        println!("Verifying catalog at {:?}", path);
        println!();
        print_report(&report);
        println!();
    }

    if report.is_consistent() {
        if format != "json" {
            println!("✓ Content version consistent");
        }
        Ok(())
    } else {
        if format != "json" {
            println!("✗ Content version drift detected (run `storyline rebuild`)");
        }
        Err("Verification failed".into())
    }
}

fn print_report(report: &DriftReport) {
    println!("Version: {}", report.version);
    print_ids("Missing from aggregate", &report.missing);
    print_ids("Stale checksums", &report.stale);
    print_ids("Orphaned entries", &report.orphaned);
    print_ids("Stale story checksum fields", &report.stale_story_checksums);
    if report.count_mismatch {
        println!("  totalStories does not match the checksum map");
    }
}

fn print_ids(label: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    println!("  {} ({}):", label, ids.len());
    for id in ids.iter().take(20) {
        println!("    - {}", id);
    }
    if ids.len() > 20 {
        println!("    ... and {} more", ids.len() - 20);
    }
}

/// Renders a drift report as JSON.
pub fn report_json(report: &DriftReport) -> serde_json::Value {
    serde_json::json!({
        "version": report.version,
        "consistent": report.is_consistent(),
        "missing": report.missing,
        "stale": report.stale,
        "orphaned": report.orphaned,
        "staleStoryChecksums": report.stale_story_checksums,
        "countMismatch": report.count_mismatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_testkit::{sample_catalog, with_file_catalog};

    #[test]
    fn verify_fails_on_drift() {
        with_file_catalog(|catalog, _| {
            catalog.save_all(sample_catalog(2));
            catalog.stories().delete("story-001").unwrap();

            let report = catalog.repair().verify().unwrap();
            let json = report_json(&report);
            assert_eq!(json["consistent"], false);
            assert_eq!(json["orphaned"][0], "story-001");
        });
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("absent"), "text").is_err());
    }
}
