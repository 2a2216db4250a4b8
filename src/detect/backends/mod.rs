//! Concrete detector backends.
//!
//! `stub` backends segment a bright figure against a dark background and
//! are always available; they drive tests and the synthetic demo. The
//! `tract` backend (feature `backend-tract`) runs YOLO-style ONNX models
//! for real deployments.

pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubPersonBackend, StubPoseBackend};
#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
