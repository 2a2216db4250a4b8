//! Fall analysis: rules, keypoint smoothing, and temporal confirmation.

pub mod rule;
pub mod smoothing;
pub mod state;

pub use rule::{BBoxRule, PoseRule, RuleEngine};
pub use smoothing::{KeypointSmoother, OneEuroFilter};
pub use state::{DelayConfirm, FallState};
