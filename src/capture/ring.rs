use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::capture::frame::FrameData;

/// Fixed-capacity rolling window of captured frames.
///
/// Capacity is `floor(buffer_seconds * fps)`. The capture thread is the
/// only writer; clip recording and skeleton collection read via
/// [`FrameRing::get_clip`], which snapshots matching frames (the pixel
/// buffers are `Arc`-shared, so later eviction cannot invalidate a
/// snapshot). A single mutex around the deque is sufficient at this
/// contention level.
pub struct FrameRing {
    frames: Mutex<VecDeque<FrameData>>,
    capacity: usize,
}

impl FrameRing {
    pub fn new(buffer_seconds: f64, fps: f64) -> Self {
        let capacity = (buffer_seconds * fps).floor() as usize;
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // The deque is never left mid-mutation by this type, so a poisoned
    // lock is recoverable; the producer must keep running either way.
    fn frames(&self) -> MutexGuard<'_, VecDeque<FrameData>> {
        self.frames.lock().unwrap_or_else(|poisoned| {
            log::error!("frame ring lock poisoned, recovering buffer");
            poisoned.into_inner()
        })
    }

    /// Append a frame, evicting the oldest when full. Never blocks the
    /// producer beyond the mutex hold.
    pub fn push(&self, frame: FrameData) {
        let mut frames = self.frames();
        while frames.len() >= self.capacity.max(1) {
            frames.pop_front();
        }
        if self.capacity > 0 {
            frames.push_back(frame);
        }
    }

    /// Frames with `event_time - before_sec <= ts <= event_time + after_sec`,
    /// in buffer order. An empty buffer yields an empty clip.
    pub fn get_clip(&self, event_time: f64, before_sec: f64, after_sec: f64) -> Vec<FrameData> {
        let start = event_time - before_sec;
        let end = event_time + after_sec;
        self.frames()
            .iter()
            .filter(|f| f.timestamp >= start && f.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.frames().clear();
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
