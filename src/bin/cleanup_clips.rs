//! cleanup-clips - one-shot clip retention sweep
//!
//! Deletes recorded clips whose event rows are older than the retention
//! window and clears their paths in the event store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use fallwatch::lifecycle::cleanup::ClipCleanup;
use fallwatch::{EventStore, FallwatchConfig};

#[derive(Parser, Debug)]
#[command(name = "cleanup-clips", about = "Delete clips past their retention window")]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "FALLWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Report what would be deleted without touching anything.
    #[arg(long)]
    dry_run: bool,

    /// Override the configured retention window.
    #[arg(long)]
    retention_days: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = FallwatchConfig::load_from(args.config.as_deref())?;
    let retention_days = args
        .retention_days
        .unwrap_or(config.lifecycle.clip_retention_days);

    let store = Arc::new(EventStore::open(&config.db_path)?);
    let cleanup = ClipCleanup::new(store, retention_days);
    let stats = cleanup.run(args.dry_run)?;

    if args.dry_run {
        println!(
            "dry-run: {} clips would be deleted ({} rows skipped)",
            stats.would_delete_count, stats.skipped_count
        );
    } else {
        println!(
            "deleted {} clips, freed {} bytes, skipped {} rows in {:.2}s",
            stats.deleted_count, stats.freed_bytes, stats.skipped_count, stats.duration_sec
        );
    }
    Ok(())
}
