//! Keypoint smoothing.
//!
//! Pose estimators jitter frame to frame; a One Euro filter per keypoint
//! coordinate removes the noise without adding lag to fast motion, which
//! matters here because a fall *is* fast motion.

pub mod keypoint;
pub mod one_euro;

pub use keypoint::KeypointSmoother;
pub use one_euro::OneEuroFilter;
