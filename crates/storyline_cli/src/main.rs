//! Storyline CLI
//!
//! Operator tools for a file-backed Storyline catalog.
//!
//! # Commands
//!
//! - `import` - Save stories from a JSON file through the catalog
//! - `inspect` - Display content version and catalog statistics
//! - `verify` - Compare the content version against story content
//! - `rebuild` - Recompute the content version from story content
//! - `sync` - Replay a client delta sync against the catalog
//! - `sign` - Produce signed asset URLs

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Storyline command-line catalog tools.
#[derive(Parser)]
#[command(name = "storyline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the catalog store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save stories from a JSON file
    Import {
        /// JSON file holding an array of stories or {"stories": [...]}
        file: PathBuf,

        /// Validate only, write nothing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Display content version and catalog statistics
    Inspect {
        /// List every story
        #[arg(short, long)]
        stories: bool,

        /// List stories in one category
        #[arg(short, long)]
        category: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compare the content version against story content
    Verify {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Recompute the content version from story content
    Rebuild {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Replay a client delta sync
    Sync {
        /// Wire-format request body (defaults to an initial sync)
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Produce signed asset URLs
    Sign {
        /// Base URL of the asset host
        #[arg(short, long)]
        base_url: String,

        /// Signing secret (falls back to STORYLINE_SIGNING_SECRET)
        #[arg(short, long)]
        secret: Option<String>,

        /// URL lifetime in seconds
        #[arg(short, long, default_value = "900")]
        ttl: u64,

        /// Check this signed URL instead of signing
        #[arg(long, conflicts_with = "paths")]
        check: Option<String>,

        /// Asset paths to sign
        paths: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Import { file, dry_run } => {
            let path = cli.path.ok_or("Catalog path required for import")?;
            commands::import::run(&path, &file, dry_run)?;
        }
        Commands::Inspect {
            stories,
            category,
            format,
        } => {
            let path = cli.path.ok_or("Catalog path required for inspect")?;
            commands::inspect::run(&path, stories, category.as_deref(), &format)?;
        }
        Commands::Verify { format } => {
            let path = cli.path.ok_or("Catalog path required for verify")?;
            commands::verify::run(&path, &format)?;
        }
        Commands::Rebuild { dry_run } => {
            let path = cli.path.ok_or("Catalog path required for rebuild")?;
            commands::rebuild::run(&path, dry_run)?;
        }
        Commands::Sync { request, format } => {
            let path = cli.path.ok_or("Catalog path required for sync")?;
            commands::sync::run(&path, request.as_deref(), &format)?;
        }
        Commands::Sign {
            base_url,
            secret,
            ttl,
            check,
            paths,
        } => match check {
            Some(url) => commands::sign::verify(&base_url, secret, &url)?,
            None => commands::sign::run(&base_url, secret, ttl, paths)?,
        },
        Commands::Version => {
            println!("Storyline CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
