//! Concurrent write and sync runs.
//!
//! Writers keep editing stories through the catalog while readers keep
//! running delta syncs; every response is checked for internal
//! consistency as it arrives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use storyline_core::ContentEngine;
use storyline_protocol::{DeltaSyncRequest, DeltaSyncResponse};

use crate::fixtures::sample_story;

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Sync responses that were internally inconsistent.
    pub inconsistent_responses: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Total operations performed.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops());
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Inconsistent responses: {}", self.inconsistent_responses);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer threads.
    pub writers: usize,
    /// Reader (sync) threads.
    pub readers: usize,
    /// Operations per thread.
    pub operations: usize,
    /// Distinct story IDs the writers cycle through.
    pub story_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writers: 2,
            readers: 4,
            operations: 50,
            story_count: 10,
        }
    }
}

/// Checks that a response agrees with itself.
///
/// Every returned story must be listed in the checksum map with the
/// checksum it carries, stories must be ordered by ID, and the counts must
/// match the map and the story list.
pub fn response_is_consistent(response: &DeltaSyncResponse) -> bool {
    let counts_match = response.total_stories == response.story_checksums.len() as u64
        && response.updated_stories == response.stories.len() as u64;
    let ordered = response.stories.windows(2).all(|w| w[0].id < w[1].id);
    let listed = response
        .stories
        .iter()
        .all(|s| response.story_checksums.get(&s.id) == Some(&s.checksum));
    counts_match && ordered && listed
}

/// Runs writers and syncing readers against one engine.
///
/// Writers edit the titles of `story-000` onwards; readers sync from an
/// empty client each time. A story rewritten between the aggregate read
/// and the story fetch shows up as an inconsistent response, so those are
/// counted apart from failures. With more than one writer the aggregate
/// may also lose updates; run a rebuild before asserting on it.
pub fn stress_concurrent_syncs(engine: &ContentEngine, config: &StressConfig) -> StressTestResult {
    for i in 0..config.story_count {
        let _ = engine.catalog().save_story(sample_story(&format!("story-{i:03}")));
    }

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let inconsistent = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(config.writers + config.readers);
    for w in 0..config.writers {
        let engine = engine.clone();
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        let config = config.clone();
        handles.push(thread::spawn(move || {
            for op in 0..config.operations {
                let mut story = sample_story(&format!("story-{:03}", op % config.story_count));
                story.title = format!("edit {w}-{op}");
                match engine.catalog().save_story(story) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for _ in 0..config.readers {
        let engine = engine.clone();
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        let inconsistent = Arc::clone(&inconsistent);
        let operations = config.operations;
        handles.push(thread::spawn(move || {
            for _ in 0..operations {
                match engine.reconciler().reconcile(&DeltaSyncRequest::initial()) {
                    Ok(response) => {
                        successful.fetch_add(1, Ordering::Relaxed);
                        if !response_is_consistent(&response) {
                            inconsistent.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(_) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.join();
    }

    StressTestResult {
        successful_ops: successful.load(Ordering::Relaxed),
        failed_ops: failed.load(Ordering::Relaxed),
        inconsistent_responses: inconsistent.load(Ordering::Relaxed),
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestCatalog;

    #[test]
    fn small_run_completes() {
        let catalog = TestCatalog::memory();
        let config = StressConfig {
            writers: 1,
            readers: 2,
            operations: 10,
            story_count: 3,
        };
        let result = stress_concurrent_syncs(&catalog, &config);
        assert_eq!(result.total_ops(), 30);
        assert_eq!(result.failed_ops, 0);

        // Quiescent state is always consistent.
        assert!(catalog.repair().verify().unwrap().is_consistent());
    }
}
