//! cloud-sync - skeleton artifact upload tool
//!
//! Uploads skeleton JSON files to the configured object-store bucket and
//! reconciles upload status in the event store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

use fallwatch::lifecycle::cloud_sync::{CloudSync, GcsStore};
use fallwatch::{EventStore, FallwatchConfig};

#[derive(Parser, Debug)]
#[command(name = "cloud-sync", about = "Upload skeleton artifacts to object storage")]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "FALLWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Upload every event still marked pending.
    #[arg(long)]
    upload_pending: bool,

    /// Re-attempt every event marked failed.
    #[arg(long)]
    retry_failed: bool,

    /// Upload one specific event by id (e.g. evt_1735459200).
    #[arg(long)]
    event_id: Option<String>,

    /// Print an upload status summary.
    #[arg(long)]
    status: bool,

    /// Log destinations without uploading or touching the store.
    #[arg(long)]
    dry_run: bool,

    /// Directory holding skeleton JSON files.
    #[arg(long)]
    skeleton_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = FallwatchConfig::load_from(args.config.as_deref())?;
    if !config.cloud_sync.enabled {
        return Err(anyhow!("cloud sync is disabled in the configuration"));
    }

    let store = Arc::new(EventStore::open(&config.db_path)?);
    let skeleton_dir = args
        .skeleton_dir
        .unwrap_or_else(|| PathBuf::from(&config.lifecycle.skeleton_output_dir));
    let sync = CloudSync::new(
        Arc::clone(&store),
        Arc::new(GcsStore::new(&config.cloud_sync.gcs_bucket)),
        &skeleton_dir,
        config.cloud_sync.retry_attempts,
        Duration::from_secs_f64(config.cloud_sync.retry_delay_seconds),
    );

    if args.status {
        let counts = store.upload_status_counts()?;
        println!("uploaded: {}", counts.uploaded);
        println!("pending:  {}", counts.pending);
        println!("failed:   {}", counts.failed);
        for record in store.find_failed_uploads()?.iter().take(5) {
            println!(
                "  {}: {}",
                record.event_id,
                record.skeleton_upload_error.as_deref().unwrap_or("unknown")
            );
        }
        return Ok(());
    }

    if args.upload_pending {
        let stats = sync.upload_pending(args.dry_run)?;
        println!("success: {}, failed: {}", stats.success, stats.failed);
        return Ok(());
    }

    if args.retry_failed {
        let stats = sync.retry_failed(args.dry_run)?;
        println!("success: {}, failed: {}", stats.success, stats.failed);
        return Ok(());
    }

    if let Some(event_id) = args.event_id {
        let local_path = skeleton_dir.join(format!("{}.json", event_id));
        if !local_path.exists() {
            return Err(anyhow!("skeleton file not found: {}", local_path.display()));
        }
        if sync.upload(&event_id, &local_path, args.dry_run) {
            println!("uploaded {}", event_id);
            return Ok(());
        }
        return Err(anyhow!("upload failed for {}", event_id));
    }

    Err(anyhow!(
        "nothing to do: pass --upload-pending, --retry-failed, --event-id, or --status"
    ))
}
