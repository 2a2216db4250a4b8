//! Media encoding.

pub mod mp4;

pub use mp4::write_clip;
