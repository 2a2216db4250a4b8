//! Frame acquisition and buffering.
//!
//! The capture layer produces timestamped RGB frames and keeps a bounded
//! rolling window of them for post-event consumers. Real camera drivers
//! (V4L2, RTSP) live outside this crate; the [`camera::FrameSource`] trait
//! is the seam they plug into, and [`camera::SyntheticCamera`] provides a
//! deterministic source for tests and demos.

pub mod camera;
pub mod frame;
pub mod ring;

pub use camera::{FrameSource, Scene, SyntheticCamera};
pub use frame::{FrameData, FrameImage};
pub use ring::FrameRing;
