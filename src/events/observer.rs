use anyhow::Result;

/// A confirmed fall. Mutable counters live on the state machine's copy;
/// observers receive snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct FallEvent {
    pub event_id: String,
    pub confirmed_at: f64,
    pub last_notified_at: f64,
    pub notification_count: u32,
}

/// Resolution of a suspicion window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspectedOutcome {
    Pending,
    Confirmed,
    Cleared,
}

impl SuspectedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspectedOutcome::Pending => "pending",
            SuspectedOutcome::Confirmed => "confirmed",
            SuspectedOutcome::Cleared => "cleared",
        }
    }
}

/// The period between NORMAL -> SUSPECTED and its resolution. Exists to
/// label skeleton artifacts (cleared suspicions are negative samples);
/// never durably persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct SuspectedEvent {
    pub suspected_id: String,
    pub suspected_at: f64,
    pub outcome: SuspectedOutcome,
    pub outcome_at: Option<f64>,
}

/// Observer of confirmed falls and recoveries.
///
/// Observers are registered before the pipeline starts and invoked
/// synchronously on the capture thread in registration order. An `Err`
/// return is logged by the state machine and never aborts delivery to
/// the remaining observers.
pub trait FallEventObserver: Send + Sync {
    fn on_fall_confirmed(&self, event: &FallEvent) -> Result<()>;
    fn on_fall_recovered(&self, event: &FallEvent) -> Result<()>;
}

/// Observer of the suspicion window, for negative-sample collection.
pub trait SuspectedEventObserver: Send + Sync {
    fn on_suspected(&self, event: &SuspectedEvent) -> Result<()>;
    fn on_cleared(&self, event: &SuspectedEvent) -> Result<()>;
}
