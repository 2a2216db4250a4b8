use std::sync::Arc;

use crate::events::observer::{
    FallEvent, FallEventObserver, SuspectedEvent, SuspectedEventObserver, SuspectedOutcome,
};
use crate::{event_id_for, suspected_id_for};

/// Temporal fall state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallState {
    Normal,
    Suspected,
    Confirmed,
}

/// Delay-based fall confirmation with deduplication and re-notification.
///
/// A fallen verdict must persist for `delay_sec` before SUSPECTED
/// escalates to CONFIRMED. Confirmations inside `same_event_window` of
/// the current event are absorbed without re-emitting. While CONFIRMED,
/// observers are re-notified every `re_notify_interval`.
///
/// Observers run synchronously on the caller's thread in registration
/// order; a failing observer is logged and the rest still run.
pub struct DelayConfirm {
    state: FallState,
    delay_sec: f64,
    same_event_window: f64,
    re_notify_interval: f64,
    suspected_since: Option<f64>,
    current_event: Option<FallEvent>,
    current_suspected: Option<SuspectedEvent>,
    observers: Vec<Arc<dyn FallEventObserver>>,
    suspected_observers: Vec<Arc<dyn SuspectedEventObserver>>,
}

impl DelayConfirm {
    pub fn new(delay_sec: f64, same_event_window: f64, re_notify_interval: f64) -> Self {
        Self {
            state: FallState::Normal,
            delay_sec,
            same_event_window,
            re_notify_interval,
            suspected_since: None,
            current_event: None,
            current_suspected: None,
            observers: Vec::new(),
            suspected_observers: Vec::new(),
        }
    }

    /// Register a fall observer. Call before the pipeline starts; the
    /// observer list is read-only once updates begin.
    pub fn add_observer(&mut self, observer: Arc<dyn FallEventObserver>) {
        self.observers.push(observer);
    }

    pub fn add_suspected_observer(&mut self, observer: Arc<dyn SuspectedEventObserver>) {
        self.suspected_observers.push(observer);
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    pub fn current_event(&self) -> Option<&FallEvent> {
        self.current_event.as_ref()
    }

    pub fn current_suspected(&self) -> Option<&SuspectedEvent> {
        self.current_suspected.as_ref()
    }

    /// Feed one frame verdict; returns the resulting state.
    pub fn update(&mut self, is_fallen: bool, now: f64) -> FallState {
        match self.state {
            FallState::Normal => {
                if is_fallen {
                    self.state = FallState::Suspected;
                    self.suspected_since = Some(now);
                    let suspected = SuspectedEvent {
                        suspected_id: suspected_id_for(now),
                        suspected_at: now,
                        outcome: SuspectedOutcome::Pending,
                        outcome_at: None,
                    };
                    self.emit_suspected(&suspected);
                    self.current_suspected = Some(suspected);
                }
            }
            FallState::Suspected => {
                if !is_fallen {
                    self.clear_suspicion(now);
                } else if now - self.suspected_since.unwrap_or(now) >= self.delay_sec {
                    self.confirm(now);
                }
            }
            FallState::Confirmed => {
                if !is_fallen {
                    self.recover(now);
                } else {
                    self.check_re_notify(now);
                }
            }
        }
        self.state
    }

    fn confirm(&mut self, now: f64) {
        self.state = FallState::Confirmed;

        // The suspicion resolved to a confirmation either way; mark it so
        // the conductor can route it to the skeleton collector.
        if let Some(suspected) = &mut self.current_suspected {
            suspected.outcome = SuspectedOutcome::Confirmed;
            suspected.outcome_at = Some(now);
        }

        // Within the same-event window this is the same incident: absorb
        // it without emitting a new event.
        if let Some(current) = &self.current_event {
            if now - current.confirmed_at < self.same_event_window {
                return;
            }
        }

        let event = FallEvent {
            event_id: event_id_for(now),
            confirmed_at: now,
            last_notified_at: now,
            notification_count: 1,
        };
        self.emit_confirmed(&event);
        self.current_event = Some(event);
    }

    fn check_re_notify(&mut self, now: f64) {
        let Some(event) = &mut self.current_event else {
            return;
        };
        if now - event.last_notified_at >= self.re_notify_interval {
            event.last_notified_at = now;
            event.notification_count += 1;
            let snapshot = event.clone();
            self.emit_confirmed(&snapshot);
        }
    }

    fn recover(&mut self, _now: f64) {
        self.state = FallState::Normal;
        if let Some(event) = self.current_event.clone() {
            for observer in &self.observers {
                if let Err(e) = observer.on_fall_recovered(&event) {
                    log::error!("observer failed on recovery of {}: {:#}", event.event_id, e);
                }
            }
        }
        self.suspected_since = None;
        self.current_suspected = None;
    }

    fn clear_suspicion(&mut self, now: f64) {
        self.state = FallState::Normal;
        self.suspected_since = None;
        if let Some(mut suspected) = self.current_suspected.take() {
            suspected.outcome = SuspectedOutcome::Cleared;
            suspected.outcome_at = Some(now);
            for observer in &self.suspected_observers {
                if let Err(e) = observer.on_cleared(&suspected) {
                    log::error!(
                        "suspected-observer failed on clear of {}: {:#}",
                        suspected.suspected_id,
                        e
                    );
                }
            }
        }
    }

    fn emit_confirmed(&self, event: &FallEvent) {
        for observer in &self.observers {
            if let Err(e) = observer.on_fall_confirmed(event) {
                log::error!(
                    "observer failed on confirmation of {}: {:#}",
                    event.event_id,
                    e
                );
            }
        }
    }

    fn emit_suspected(&self, event: &SuspectedEvent) {
        for observer in &self.suspected_observers {
            if let Err(e) = observer.on_suspected(event) {
                log::error!(
                    "suspected-observer failed on {}: {:#}",
                    event.suspected_id,
                    e
                );
            }
        }
    }
}
