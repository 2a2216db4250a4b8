use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::analysis::rule::RuleEngine;
use crate::analysis::state::{DelayConfirm, FallState};
use crate::capture::camera::FrameSource;
use crate::capture::frame::FrameData;
use crate::capture::ring::FrameRing;
use crate::config::FallwatchConfig;
use crate::detect::detector::Detector;
use crate::detect::types::Detection;
use crate::epoch_now;
use crate::events::notifier::PushNotifier;
use crate::events::recorder::ClipRecorder;
use crate::events::store::EventStore;
use crate::lifecycle::cleanup::ClipCleanup;
use crate::lifecycle::cloud_sync::{CloudSync, GcsStore};
use crate::lifecycle::collector::SkeletonCollector;
use crate::lifecycle::extractor::SkeletonExtractor;
use crate::lifecycle::scheduler::CleanupScheduler;
use crate::StopSignal;

/// Interval between pending-upload sweeps of the background sync worker.
const UPLOAD_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the capture loop and every long-lived component, and wires the
/// observer graph before the first frame flows.
///
/// Thread layout: the hot capture/detect/rule/push/update sequence runs
/// on the caller's thread; clip encoding runs on one-shot timer threads;
/// skeleton extraction on the collector's bounded pool; upload and
/// retention sweeps on their own workers.
pub struct Pipeline {
    camera: Box<dyn FrameSource>,
    detector: Detector,
    rule: RuleEngine,
    ring: Arc<FrameRing>,
    state: DelayConfirm,
    store: Arc<EventStore>,
    recorder: Arc<ClipRecorder>,
    collector: Option<Arc<SkeletonCollector>>,
    scheduler: CleanupScheduler,
    sync_stop: Arc<StopSignal>,
    sync_worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Build and wire the full component graph. The camera, detector,
    /// and rule engine are injected so the daemon can choose backends;
    /// everything downstream comes from the configuration.
    pub fn new(
        config: &FallwatchConfig,
        camera: Box<dyn FrameSource>,
        detector: Detector,
        pose_extractor: Option<SkeletonExtractor>,
        rule: RuleEngine,
    ) -> Result<Self> {
        let ring = Arc::new(FrameRing::new(
            config.recording.buffer_seconds,
            config.camera.fps as f64,
        ));
        let store = Arc::new(EventStore::open(&config.db_path)?);

        let recorder = Arc::new(ClipRecorder::new(
            Arc::clone(&ring),
            Arc::clone(&store),
            &config.clips_dir,
            config.camera.fps,
            config.recording.clip_before_sec,
            config.recording.clip_after_sec,
        ));
        let notifier = Arc::new(PushNotifier::new(
            &config.notification.channel_access_token,
            &config.notification.user_id,
            config.notification.enabled,
        ));

        let mut state = DelayConfirm::new(
            config.analysis.delay_sec,
            config.analysis.same_event_window,
            config.analysis.re_notify_interval,
        );
        state.add_observer(Arc::clone(&store) as Arc<dyn crate::FallEventObserver>);
        state.add_observer(notifier);
        state.add_observer(Arc::clone(&recorder) as Arc<dyn crate::FallEventObserver>);

        let collector = match (config.lifecycle.auto_skeleton_extract, pose_extractor) {
            (true, Some(extractor)) => {
                let collector = Arc::new(SkeletonCollector::new(
                    Arc::clone(&ring),
                    extractor,
                    &config.lifecycle.skeleton_output_dir,
                    config.recording.clip_before_sec,
                    config.recording.clip_after_sec,
                    config.camera.fps as f64,
                    SkeletonCollector::DEFAULT_WORKERS,
                ));
                state.add_suspected_observer(
                    Arc::clone(&collector) as Arc<dyn crate::SuspectedEventObserver>
                );
                Some(collector)
            }
            _ => None,
        };

        let scheduler = CleanupScheduler::new(
            ClipCleanup::new(Arc::clone(&store), config.lifecycle.clip_retention_days),
            Duration::from_secs_f64(config.lifecycle.cleanup_schedule_hours * 3600.0),
            config.lifecycle.cleanup_enabled,
        );
        scheduler.start();

        let sync_stop = Arc::new(StopSignal::new());
        let sync_worker = if config.cloud_sync.enabled {
            let sync = Arc::new(
                CloudSync::new(
                    Arc::clone(&store),
                    Arc::new(GcsStore::new(&config.cloud_sync.gcs_bucket)),
                    &config.lifecycle.skeleton_output_dir,
                    config.cloud_sync.retry_attempts,
                    Duration::from_secs_f64(config.cloud_sync.retry_delay_seconds),
                )
                .with_stop(Arc::clone(&sync_stop)),
            );
            Some(sync.spawn_worker(UPLOAD_SWEEP_INTERVAL))
        } else {
            None
        };

        Ok(Self {
            camera,
            detector,
            rule,
            ring,
            state,
            store,
            recorder,
            collector,
            scheduler,
            sync_stop,
            sync_worker,
        })
    }

    pub fn ring(&self) -> &Arc<FrameRing> {
        &self.ring
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Run the capture loop until `stop` flips or the camera fails hard.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        log::info!("fall detection pipeline started");
        while !stop.load(Ordering::Relaxed) {
            let image = match self.camera.read() {
                Ok(Some(image)) => image,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("camera failed: {:#}", e);
                    break;
                }
            };

            let now = epoch_now();
            let detections = self.detector.detect(&image);
            let detection = detections.first();
            let is_fallen = self.rule.evaluate(detection, now);
            let bbox = detection.and_then(Detection::bbox).copied();

            self.ring.push(FrameData {
                timestamp: now,
                image: Arc::new(image),
                bbox,
            });

            let previous = self.state.state();
            let current = self.state.update(is_fallen, now);

            if current == FallState::Confirmed && previous != FallState::Confirmed {
                log::warn!("fall confirmed");
                // Forward the resolved suspicion to the collector so the
                // positive sample gets extracted and labelled.
                if let (Some(collector), Some(suspected)) =
                    (&self.collector, self.state.current_suspected())
                {
                    if let Err(e) = collector.on_fall_confirmed_update(&suspected.clone()) {
                        log::error!(
                            "collector failed on {}: {:#}",
                            suspected.suspected_id,
                            e
                        );
                    }
                }
            }
        }
        log::info!("capture loop ended");
        Ok(())
    }

    /// Tear everything down: cancel pending clip timers, drain the
    /// extraction pool, stop the upload and retention workers.
    pub fn shutdown(&mut self) {
        log::info!("shutting down pipeline");
        self.camera.release();
        self.recorder.shutdown();
        if let Some(collector) = &self.collector {
            collector.shutdown();
        }
        self.sync_stop.stop();
        if let Some(handle) = self.sync_worker.take() {
            let _ = handle.join();
        }
        self.scheduler.stop();
    }
}
