use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::lifecycle::cleanup::{CleanupStats, ClipCleanup};
use crate::StopSignal;

/// Periodic retention enforcement.
///
/// Runs [`ClipCleanup`] on a fixed interval (default 24 h) in a
/// background thread. `stop` wakes the worker even mid-sleep, so
/// shutdown never waits for the interval to elapse.
pub struct CleanupScheduler {
    cleanup: Arc<ClipCleanup>,
    interval: Duration,
    enabled: bool,
    stop: Arc<StopSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl CleanupScheduler {
    pub const DEFAULT_INTERVAL_HOURS: f64 = 24.0;

    pub fn new(cleanup: ClipCleanup, interval: Duration, enabled: bool) -> Self {
        Self {
            cleanup: Arc::new(cleanup),
            interval,
            enabled,
            stop: Arc::new(StopSignal::new()),
            handle: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the background worker. A disabled scheduler stays idle.
    pub fn start(&self) {
        if !self.enabled {
            log::info!("cleanup scheduler disabled by configuration");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("cleanup scheduler already running");
            return;
        }

        let cleanup = Arc::clone(&self.cleanup);
        let stop = Arc::clone(&self.stop);
        let interval = self.interval;
        let worker = std::thread::spawn(move || {
            log::info!(
                "cleanup scheduler started: every {:.1} h, retaining {} days of clips",
                interval.as_secs_f64() / 3600.0,
                cleanup.retention_days()
            );
            loop {
                if stop.wait_timeout(interval) {
                    return;
                }
                match cleanup.run(false) {
                    Ok(stats) => log_sweep(&stats),
                    Err(e) => log::error!("scheduled cleanup failed: {:#}", e),
                }
            }
        });
        *self.handle_slot() = Some(worker);
    }

    /// Stop the worker and wait for it, even if it is mid-sleep.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop.stop();
        if let Some(handle) = self.handle_slot().take() {
            let _ = handle.join();
        }
        log::info!("cleanup scheduler stopped");
    }

    // The slot only ever holds a join handle; recover it from a poisoned
    // lock so shutdown still joins the worker.
    fn handle_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run one sweep immediately on the caller's thread.
    pub fn run_now(&self) -> Result<CleanupStats> {
        let stats = self.cleanup.run(false)?;
        log_sweep(&stats);
        Ok(stats)
    }
}

fn log_sweep(stats: &CleanupStats) {
    if stats.deleted_count > 0 {
        log::info!(
            "cleanup: deleted {} clips, freed {} bytes in {:.2}s",
            stats.deleted_count,
            stats.freed_bytes,
            stats.duration_sec
        );
    } else {
        log::info!("cleanup: nothing to delete");
    }
    if stats.skipped_count > 0 {
        log::warn!("cleanup: skipped {} rows", stats.skipped_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch_now;
    use crate::events::store::EventStore;

    fn scheduler(enabled: bool) -> (CleanupScheduler, Arc<EventStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let old = epoch_now() - 10.0 * 86_400.0;
        let path = dir.path().join("evt_0.mp4");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        store.insert_or_replace("evt_0", old, 1, old).unwrap();
        store.set_clip_path("evt_0", &path.to_string_lossy()).unwrap();
        let cleanup = ClipCleanup::new(Arc::clone(&store), 7);
        (
            CleanupScheduler::new(cleanup, Duration::from_secs(3600), enabled),
            store,
            dir,
        )
    }

    #[test]
    fn run_now_sweeps_immediately() {
        let (scheduler, store, _dir) = scheduler(true);
        let stats = scheduler.run_now().unwrap();
        assert_eq!(stats.deleted_count, 1);
        assert!(store.find_expired_clips(epoch_now()).unwrap().is_empty());
    }

    #[test]
    fn disabled_scheduler_does_not_start() {
        let (scheduler, _store, _dir) = scheduler(false);
        scheduler.start();
        assert!(!scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn stop_interrupts_the_interval_sleep() {
        let (scheduler, _store, _dir) = scheduler(true);
        scheduler.start();
        assert!(scheduler.is_running());
        let started = std::time::Instant::now();
        scheduler.stop();
        // Joining must not wait for the one-hour interval.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!scheduler.is_running());
    }
}
