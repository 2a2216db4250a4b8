use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use crate::capture::ring::FrameRing;
use crate::events::observer::{FallEvent, FallEventObserver};
use crate::events::store::EventStore;
use crate::media;

struct PendingRecording {
    cancel: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Records a pre/post clip for each confirmed fall.
///
/// `on_fall_confirmed` schedules a one-shot timer `clip_after_sec` out so
/// the ring buffer has time to accumulate the post-roll. Each timer is a
/// short-lived thread parked on a channel: receiving cancels it, timeout
/// fires the recording. `shutdown` cancels everything still pending and
/// joins the threads.
pub struct ClipRecorder {
    ring: Arc<FrameRing>,
    store: Arc<EventStore>,
    output_dir: PathBuf,
    fps: u32,
    clip_before_sec: f64,
    clip_after_sec: f64,
    pending: Arc<Mutex<HashMap<u64, PendingRecording>>>,
    next_token: AtomicU64,
}

impl ClipRecorder {
    pub fn new(
        ring: Arc<FrameRing>,
        store: Arc<EventStore>,
        output_dir: impl Into<PathBuf>,
        fps: u32,
        clip_before_sec: f64,
        clip_after_sec: f64,
    ) -> Self {
        Self {
            ring,
            store,
            output_dir: output_dir.into(),
            fps,
            clip_before_sec,
            clip_after_sec,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        }
    }

    /// `YYYYMMDD_HHMMSS_<event_id>.mp4`, stamped at recording time (UTC).
    fn clip_filename(event_id: &str) -> String {
        format!("{}_{}.mp4", Utc::now().format("%Y%m%d_%H%M%S"), event_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    /// Cancel all pending timers and wait for their threads.
    pub fn shutdown(&self) {
        let drained: Vec<PendingRecording> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, rec)| rec).collect(),
            Err(_) => {
                log::error!("recorder lock poisoned, leaving pending timers to lapse");
                Vec::new()
            }
        };
        for rec in drained {
            let _ = rec.cancel.send(());
            let _ = rec.handle.join();
        }
    }

    fn record_clip(
        ring: &FrameRing,
        store: &EventStore,
        output_dir: &PathBuf,
        fps: u32,
        clip_before_sec: f64,
        clip_after_sec: f64,
        event: &FallEvent,
    ) {
        let frames = ring.get_clip(event.confirmed_at, clip_before_sec, clip_after_sec);
        if frames.is_empty() {
            log::warn!("no buffered frames for {}, skipping clip", event.event_id);
            return;
        }
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            log::error!("cannot create clip directory: {:#}", e);
            return;
        }
        let path = output_dir.join(Self::clip_filename(&event.event_id));
        match media::write_clip(&path, &frames, fps) {
            Ok(()) => {
                log::info!(
                    "clip saved for {}: {} ({} frames)",
                    event.event_id,
                    path.display(),
                    frames.len()
                );
                if let Err(e) = store.set_clip_path(&event.event_id, &path.to_string_lossy()) {
                    log::error!("failed to persist clip path for {}: {:#}", event.event_id, e);
                }
            }
            Err(e) => {
                log::error!("clip encoding failed for {}: {:#}", event.event_id, e);
            }
        }
    }
}

impl FallEventObserver for ClipRecorder {
    fn on_fall_confirmed(&self, event: &FallEvent) -> Result<()> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let delay = Duration::from_secs_f64(self.clip_after_sec.max(0.0));

        let ring = Arc::clone(&self.ring);
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let output_dir = self.output_dir.clone();
        let fps = self.fps;
        let clip_before_sec = self.clip_before_sec;
        let clip_after_sec = self.clip_after_sec;
        let event = event.clone();

        let handle = std::thread::spawn(move || {
            match cancel_rx.recv_timeout(delay) {
                // Timer elapsed: extract and encode.
                Err(RecvTimeoutError::Timeout) => {
                    Self::record_clip(
                        &ring,
                        &store,
                        &output_dir,
                        fps,
                        clip_before_sec,
                        clip_after_sec,
                        &event,
                    );
                }
                // Cancelled (or recorder dropped): do nothing.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            }
            if let Ok(mut pending) = pending.lock() {
                pending.remove(&token);
            }
        });

        self.pending
            .lock()
            .map_err(|_| anyhow::anyhow!("clip recorder lock poisoned"))?
            .insert(
                token,
                PendingRecording {
                    cancel: cancel_tx,
                    handle,
                },
            );
        Ok(())
    }

    fn on_fall_recovered(&self, event: &FallEvent) -> Result<()> {
        log::debug!("fall recovered: {}", event.event_id);
        Ok(())
    }
}
