//! Person and pose detection.
//!
//! Inference runs behind the [`backend::DetectorBackend`] trait. The
//! default build ships deterministic stub backends that segment the
//! synthetic camera's figure; the `backend-tract` feature adds an ONNX
//! backend for real models. [`detector::Detector`] is the front-end the
//! pipeline talks to: it owns a backend and turns backend errors into
//! empty results so inference failures never crash the capture loop.

pub mod backend;
pub mod backends;
pub mod detector;
pub mod types;

pub use backend::{DetectionKind, DetectorBackend};
pub use detector::Detector;
pub use types::{BBox, Detection, Keypoint, Skeleton, NUM_KEYPOINTS};
