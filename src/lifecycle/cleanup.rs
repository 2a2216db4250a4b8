use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::epoch_now;
use crate::events::store::EventStore;

/// Result of one retention sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CleanupStats {
    pub deleted_count: u64,
    pub freed_bytes: u64,
    pub skipped_count: u64,
    pub would_delete_count: u64,
    pub duration_sec: f64,
}

/// Deletes clips whose event rows have outlived the retention window.
///
/// Per-file errors are isolated: a missing file or failed delete marks
/// the row skipped and the sweep continues. Dry-run counts what would go
/// without touching the filesystem or the store.
pub struct ClipCleanup {
    store: Arc<EventStore>,
    retention_days: u32,
}

impl ClipCleanup {
    pub const DEFAULT_RETENTION_DAYS: u32 = 7;

    pub fn new(store: Arc<EventStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn run(&self, dry_run: bool) -> Result<CleanupStats> {
        let started = Instant::now();
        let cutoff = epoch_now() - self.retention_days as f64 * 86_400.0;
        let expired = self.store.find_expired_clips(cutoff)?;

        let mut stats = CleanupStats::default();
        for record in expired {
            let path = Path::new(&record.clip_path);
            if !path.exists() {
                stats.skipped_count += 1;
                if !dry_run {
                    // Stale row; drop the dangling path either way.
                    self.store.clear_clip_path(&record.event_id)?;
                }
                continue;
            }

            if dry_run {
                stats.would_delete_count += 1;
                continue;
            }

            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            match std::fs::remove_file(path) {
                Ok(()) => {
                    stats.deleted_count += 1;
                    stats.freed_bytes += size;
                    self.store.clear_clip_path(&record.event_id)?;
                }
                Err(e) => {
                    // Leave the row pointing at the file so the next sweep
                    // retries the delete.
                    log::warn!("failed to delete {}: {}", record.clip_path, e);
                    stats.skipped_count += 1;
                }
            }
        }

        stats.duration_sec = started.elapsed().as_secs_f64();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aged_store_with_files(
        dir: &Path,
        count: usize,
        age_days: f64,
    ) -> (Arc<EventStore>, Vec<std::path::PathBuf>) {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let created_at = epoch_now() - age_days * 86_400.0;
        let mut paths = Vec::new();
        for i in 0..count {
            let event_id = format!("evt_{}", i);
            let path = dir.join(format!("{}.mp4", event_id));
            std::fs::write(&path, vec![0u8; 100]).unwrap();
            store
                .insert_or_replace(&event_id, created_at, 1, created_at)
                .unwrap();
            store
                .set_clip_path(&event_id, &path.to_string_lossy())
                .unwrap();
            paths.push(path);
        }
        (store, paths)
    }

    #[test]
    fn dry_run_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = aged_store_with_files(dir.path(), 10, 10.0);
        let cleanup = ClipCleanup::new(Arc::clone(&store), 7);

        let stats = cleanup.run(true).unwrap();
        assert_eq!(stats.would_delete_count, 10);
        assert_eq!(stats.deleted_count, 0);
        assert_eq!(stats.freed_bytes, 0);
        for path in &paths {
            assert!(path.exists());
        }
        // Store untouched: rows still carry their clip paths.
        assert_eq!(store.find_expired_clips(epoch_now()).unwrap().len(), 10);
    }

    #[test]
    fn sweep_deletes_expired_and_clears_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = aged_store_with_files(dir.path(), 3, 10.0);
        let cleanup = ClipCleanup::new(Arc::clone(&store), 7);

        let stats = cleanup.run(false).unwrap();
        assert_eq!(stats.deleted_count, 3);
        assert_eq!(stats.freed_bytes, 300);
        assert_eq!(stats.skipped_count, 0);
        for path in &paths {
            assert!(!path.exists());
        }
        assert!(store.find_expired_clips(epoch_now()).unwrap().is_empty());
    }

    #[test]
    fn recent_clips_survive() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = aged_store_with_files(dir.path(), 2, 1.0);
        let cleanup = ClipCleanup::new(store, 7);

        let stats = cleanup.run(false).unwrap();
        assert_eq!(stats.deleted_count, 0);
        for path in &paths {
            assert!(path.exists());
        }
    }

    #[test]
    fn missing_files_count_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = aged_store_with_files(dir.path(), 2, 10.0);
        std::fs::remove_file(&paths[0]).unwrap();
        let cleanup = ClipCleanup::new(Arc::clone(&store), 7);

        let stats = cleanup.run(false).unwrap();
        assert_eq!(stats.skipped_count, 1);
        assert_eq!(stats.deleted_count, 1);
        // Both rows lost their clip path, including the dangling one.
        assert!(store.find_expired_clips(epoch_now()).unwrap().is_empty());
    }
}
