use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use threadpool::ThreadPool;

use crate::capture::ring::FrameRing;
use crate::events::observer::{SuspectedEvent, SuspectedEventObserver};
use crate::lifecycle::extractor::SkeletonExtractor;

/// Collects skeleton training samples around suspicion windows.
///
/// `on_suspected` only remembers the event; frames are snapshotted when
/// the outcome is known (cleared by the state machine, or confirmed via
/// the conductor calling [`SkeletonCollector::on_fall_confirmed_update`]).
/// Extraction happens on a small bounded pool so a burst of events queues
/// instead of starving the capture thread.
pub struct SkeletonCollector {
    ring: Arc<FrameRing>,
    output_dir: PathBuf,
    clip_before_sec: f64,
    clip_after_sec: f64,
    fps: f64,
    pending: Mutex<HashMap<String, SuspectedEvent>>,
    pool: ThreadPool,
    extractor: Arc<Mutex<SkeletonExtractor>>,
    extraction_count: AtomicU64,
}

impl SkeletonCollector {
    pub const DEFAULT_WORKERS: usize = 2;

    pub fn new(
        ring: Arc<FrameRing>,
        extractor: SkeletonExtractor,
        output_dir: impl Into<PathBuf>,
        clip_before_sec: f64,
        clip_after_sec: f64,
        fps: f64,
        workers: usize,
    ) -> Self {
        Self {
            ring,
            output_dir: output_dir.into(),
            clip_before_sec,
            clip_after_sec,
            fps,
            pending: Mutex::new(HashMap::new()),
            pool: ThreadPool::new(workers.max(1)),
            extractor: Arc::new(Mutex::new(extractor)),
            extraction_count: AtomicU64::new(0),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    pub fn extraction_count(&self) -> u64 {
        self.extraction_count.load(Ordering::Relaxed)
    }

    /// Conductor hook: the suspicion resolved to CONFIRMED.
    pub fn on_fall_confirmed_update(&self, event: &SuspectedEvent) -> Result<()> {
        self.resolve(event)
    }

    fn resolve(&self, event: &SuspectedEvent) -> Result<()> {
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| anyhow!("collector lock poisoned"))?;
            if pending.remove(&event.suspected_id).is_none() {
                return Ok(());
            }
        }

        // Snapshot immediately so the window is not evicted while the job
        // waits in the pool queue.
        let frames = self
            .ring
            .get_clip(event.suspected_at, self.clip_before_sec, self.clip_after_sec);
        if frames.is_empty() {
            log::warn!("no frames available for {}", event.suspected_id);
            return Ok(());
        }
        self.extraction_count.fetch_add(1, Ordering::Relaxed);

        let extractor = Arc::clone(&self.extractor);
        let output_path = self
            .output_dir
            .join(format!("{}_{}.json", event.suspected_id, event.outcome.as_str()));
        let suspected_id = event.suspected_id.clone();
        let fps = self.fps;
        self.pool.execute(move || {
            let mut extractor = match extractor.lock() {
                Ok(extractor) => extractor,
                Err(_) => {
                    log::error!("extractor lock poisoned, dropping {}", suspected_id);
                    return;
                }
            };
            match extractor.extract_and_save(&frames, &suspected_id, fps, &output_path) {
                Ok(()) => log::info!("skeleton saved: {}", output_path.display()),
                Err(e) => log::error!("failed to save skeleton for {}: {:#}", suspected_id, e),
            }
        });
        Ok(())
    }

    /// Wait for queued extractions to finish.
    pub fn shutdown(&self) {
        self.pool.join();
    }
}

impl SuspectedEventObserver for SkeletonCollector {
    fn on_suspected(&self, event: &SuspectedEvent) -> Result<()> {
        log::info!("suspected event recorded: {}", event.suspected_id);
        self.pending
            .lock()
            .map_err(|_| anyhow!("collector lock poisoned"))?
            .insert(event.suspected_id.clone(), event.clone());
        Ok(())
    }

    fn on_cleared(&self, event: &SuspectedEvent) -> Result<()> {
        log::info!("suspicion cleared: {}, extracting skeleton", event.suspected_id);
        self.resolve(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameData, FrameImage};
    use crate::detect::backend::DetectionKind;
    use crate::detect::backends::stub::StubPoseBackend;
    use crate::detect::detector::Detector;
    use crate::events::observer::SuspectedOutcome;
    use crate::lifecycle::schema::{self, SkeletonSequence};

    fn collector(dir: &std::path::Path) -> SkeletonCollector {
        let ring = Arc::new(FrameRing::new(10.0, 15.0));
        for i in 0..40 {
            let mut img = FrameImage::filled(96, 96, [16, 16, 16]);
            img.fill_rect(30, 10, 14, 70, [220, 220, 220]);
            ring.push(FrameData {
                timestamp: 100.0 + i as f64 / 15.0,
                image: Arc::new(img),
                bbox: None,
            });
        }
        let detector =
            Detector::new(Box::new(StubPoseBackend::new()), DetectionKind::Pose).unwrap();
        let extractor = SkeletonExtractor::new(detector, "synthetic");
        SkeletonCollector::new(ring, extractor, dir, 2.0, 2.0, 15.0, 2)
    }

    fn suspected(id: &str, at: f64, outcome: SuspectedOutcome) -> SuspectedEvent {
        SuspectedEvent {
            suspected_id: id.into(),
            suspected_at: at,
            outcome,
            outcome_at: Some(at + 1.0),
        }
    }

    #[test]
    fn cleared_suspicion_writes_negative_sample() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(dir.path());

        collector
            .on_suspected(&suspected("sus_101", 101.0, SuspectedOutcome::Pending))
            .unwrap();
        assert_eq!(collector.pending_count(), 1);

        collector
            .on_cleared(&suspected("sus_101", 101.0, SuspectedOutcome::Cleared))
            .unwrap();
        collector.shutdown();

        assert_eq!(collector.pending_count(), 0);
        assert_eq!(collector.extraction_count(), 1);
        let path = dir.path().join("sus_101_cleared.json");
        let doc = SkeletonSequence::from_json_file(&path).unwrap();
        schema::validate(&doc).unwrap();
        assert!(!doc.sequence.is_empty());
        assert_eq!(doc.metadata.event_id, "sus_101");
    }

    #[test]
    fn confirmed_suspicion_writes_positive_sample() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(dir.path());

        collector
            .on_suspected(&suspected("sus_101", 101.0, SuspectedOutcome::Pending))
            .unwrap();
        collector
            .on_fall_confirmed_update(&suspected(
                "sus_101",
                101.0,
                SuspectedOutcome::Confirmed,
            ))
            .unwrap();
        collector.shutdown();

        assert!(dir.path().join("sus_101_confirmed.json").exists());
    }

    #[test]
    fn unknown_suspicion_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(dir.path());
        collector
            .on_cleared(&suspected("sus_999", 101.0, SuspectedOutcome::Cleared))
            .unwrap();
        collector.shutdown();
        assert_eq!(collector.extraction_count(), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn resolving_twice_extracts_once() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(dir.path());
        collector
            .on_suspected(&suspected("sus_101", 101.0, SuspectedOutcome::Pending))
            .unwrap();
        let confirmed = suspected("sus_101", 101.0, SuspectedOutcome::Confirmed);
        collector.on_fall_confirmed_update(&confirmed).unwrap();
        collector.on_fall_confirmed_update(&confirmed).unwrap();
        collector.shutdown();
        assert_eq!(collector.extraction_count(), 1);
    }
}
