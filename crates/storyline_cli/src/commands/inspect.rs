//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use storyline_core::ContentEngine;
use tracing::info;

/// Catalog inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Aggregate version (0 if never written).
    pub version: u64,
    /// Aggregate last-updated time (epoch ms).
    pub last_updated: u64,
    /// Entries in the aggregate checksum map.
    pub aggregate_stories: u64,
    /// Asset aggregate version (0 if never written).
    pub asset_version: u64,
    /// Tracked assets.
    pub total_assets: u64,
    /// Sum of known asset sizes.
    pub total_asset_bytes: u64,
    /// Story documents in the store.
    pub total_stories: u64,
    /// Available story documents.
    pub available_stories: u64,
    /// Unavailable story documents.
    pub unavailable_stories: u64,
    /// Sum of download counters.
    pub total_downloads: u64,
    /// Mean rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    /// Category with the most downloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_popular_category: Option<String>,
    /// Per-story summaries (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stories: Option<Vec<StorySummary>>,
}

/// One line per story.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    /// Story ID.
    pub id: String,
    /// Category.
    pub category: String,
    /// Document version.
    pub version: u64,
    /// Whether clients see it.
    pub available: bool,
    /// Page count.
    pub pages: usize,
    /// Content checksum.
    pub checksum: String,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_stories: bool,
    category: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Inspecting catalog at {:?}", path);
    let engine = super::open_existing(path)?;
    let mut result = inspect(&engine, show_stories, category)?;
    result.path = path.display().to_string();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the inspection data.
pub fn inspect(
    engine: &ContentEngine,
    show_stories: bool,
    category: Option<&str>,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let aggregate = engine.versions().get_current()?.unwrap_or_default();
    let stats = engine.stories().stats()?;
    let assets = engine.asset_versions().get_current()?.unwrap_or_default();

    let stories = if show_stories || category.is_some() {
        let mut summaries = Vec::new();
        let mut visit = |story: storyline_protocol::Story| {
            summaries.push(StorySummary {
                pages: story.pages.len(),
                id: story.id,
                category: story.category,
                version: story.version,
                available: story.available,
                checksum: story.checksum,
            });
        };
        match category {
            Some(category) => engine
                .stories()
                .list_by_category(category)?
                .into_iter()
                .for_each(&mut visit),
            None => {
                engine.stories().scan_all(|story| {
                    visit(story);
                    Ok(())
                })?;
            }
        }
        Some(summaries)
    } else {
        None
    };

    Ok(InspectResult {
        path: String::new(),
        version: aggregate.version,
        last_updated: aggregate.last_updated,
        aggregate_stories: aggregate.total_stories,
        asset_version: assets.version,
        total_assets: assets.total_assets,
        total_asset_bytes: assets.total_size_bytes,
        total_stories: stats.total,
        available_stories: stats.available,
        unavailable_stories: stats.unavailable,
        total_downloads: stats.total_downloads,
        average_rating: stats.average_rating,
        most_popular_category: stats.most_popular_category,
        stories,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Storyline Catalog Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Content version:");
    println!("  Version:       {}", result.version);
    println!("  Last updated:  {}", result.last_updated);
    println!("  Stories:       {}", result.aggregate_stories);
    println!();
    println!("Asset version:");
    println!("  Version:       {}", result.asset_version);
    println!("  Assets:        {}", result.total_assets);
    println!("  Bytes:         {}", result.total_asset_bytes);
    println!();
    println!("Stories:");
    println!("  Total:         {}", result.total_stories);
    println!("  Available:     {}", result.available_stories);
    println!("  Unavailable:   {}", result.unavailable_stories);
    println!("  Downloads:     {}", result.total_downloads);
    if let Some(rating) = result.average_rating {
        println!("  Avg rating:    {:.2}", rating);
    }
    if let Some(category) = &result.most_popular_category {
        println!("  Top category:  {}", category);
    }

    if let Some(stories) = &result.stories {
        println!();
        for story in stories {
            let marker = if story.available { ' ' } else { '-' };
            println!(
                "  {}{} [{}] v{} {} pages {}",
                marker,
                story.id,
                story.category,
                story.version,
                story.pages,
                &story.checksum[..story.checksum.len().min(12)]
            );
        }
    }
}
