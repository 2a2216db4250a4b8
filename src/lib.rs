//! fallwatch - single-camera fall detection pipeline
//!
//! The crate is organised around one hot capture thread and a set of
//! background workers that consume its output:
//!
//! - `capture`: frame sources and the shared rolling frame buffer
//! - `detect`: person/pose inference behind a backend trait
//! - `analysis`: fall rules, keypoint smoothing, and the
//!   NORMAL -> SUSPECTED -> CONFIRMED state machine
//! - `events`: durable event store, delayed clip recording, notifications
//! - `media`: H.264/MP4 clip encoding
//! - `lifecycle`: skeleton extraction, cloud upload, clip retention
//! - `pipeline`: wires everything together and owns shutdown
//!
//! Every long-running worker observes a [`StopSignal`] so the daemon can
//! shut down cleanly from SIGINT/SIGTERM even while a worker is sleeping.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};

pub mod analysis;
pub mod capture;
pub mod config;
pub mod detect;
pub mod events;
pub mod lifecycle;
pub mod media;
pub mod pipeline;

pub use analysis::rule::RuleEngine;
pub use analysis::state::{DelayConfirm, FallState};
pub use capture::camera::{FrameSource, Scene, SyntheticCamera};
pub use capture::frame::{FrameData, FrameImage};
pub use capture::ring::FrameRing;
pub use config::FallwatchConfig;
pub use detect::detector::Detector;
pub use detect::types::{BBox, Detection, Skeleton};
pub use events::observer::{
    FallEvent, FallEventObserver, SuspectedEvent, SuspectedEventObserver, SuspectedOutcome,
};
pub use events::store::EventStore;
pub use pipeline::Pipeline;

/// Wall-clock seconds since the Unix epoch.
///
/// The pipeline uses one logical clock for frame timestamps, event
/// identifiers, and cloud path derivation. The clip recorder and the
/// retention sweep compare against the same source.
pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Event identifier for a confirmation at `ts` (seconds since epoch).
pub fn event_id_for(ts: f64) -> String {
    format!("evt_{}", ts as i64)
}

/// Suspected-event identifier for a suspicion raised at `ts`.
pub fn suspected_id_for(ts: f64) -> String {
    format!("sus_{}", ts as i64)
}

/// Extract the epoch seconds embedded in an event identifier.
///
/// Accepts both `evt_1735459200` and the fractional textual form
/// `evt_1735459200.000` that appears in upload path derivation.
pub fn parse_event_epoch(event_id: &str) -> Result<f64> {
    let suffix = event_id
        .split_once('_')
        .map(|(_, s)| s)
        .ok_or_else(|| anyhow!("malformed event id '{}'", event_id))?;
    suffix
        .parse::<f64>()
        .map_err(|_| anyhow!("event id '{}' has a non-numeric timestamp", event_id))
}

/// Cooperative stop flag shared between the hot loop and background workers.
///
/// `wait_timeout` doubles as an interruptible sleep: a worker parked on its
/// interval wakes immediately when `stop` is called.
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    // The flag stays valid across a poisoning panic, so recover the
    // guard instead of propagating.
    fn flag(&self) -> std::sync::MutexGuard<'_, bool> {
        self.stopped
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn stop(&self) {
        let mut stopped = self.flag();
        *stopped = true;
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.flag()
    }

    /// Sleep for `timeout` or until stopped. Returns true when stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.flag();
        let deadline = std::time::Instant::now() + timeout;
        while !*stopped {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            stopped = guard;
        }
        true
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn event_ids_floor_fractional_seconds() {
        assert_eq!(event_id_for(1735459200.73), "evt_1735459200");
        assert_eq!(suspected_id_for(12.999), "sus_12");
    }

    #[test]
    fn parse_event_epoch_tolerates_fractions() {
        assert_eq!(parse_event_epoch("evt_1735459200").unwrap(), 1735459200.0);
        assert_eq!(
            parse_event_epoch("evt_1735459200.000").unwrap(),
            1735459200.0
        );
        assert!(parse_event_epoch("evt_abc").is_err());
        assert!(parse_event_epoch("bogus").is_err());
    }

    #[test]
    fn stop_signal_interrupts_wait() {
        let signal = Arc::new(StopSignal::new());
        let waiter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(handle.join().unwrap());
        assert!(signal.is_stopped());
    }

    #[test]
    fn stop_signal_times_out_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }
}
