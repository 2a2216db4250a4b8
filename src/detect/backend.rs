use anyhow::Result;

use crate::detect::types::Detection;

/// What a backend can produce.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionKind {
    /// Person bounding boxes.
    Person,
    /// COCO-17 skeletons.
    Pose,
}

/// Inference backend trait.
///
/// Implementations receive an RGB24 pixel slice and return detections
/// ordered most salient first. They must treat the pixel slice as
/// read-only and ephemeral; backends never perform I/O on the capture
/// path beyond model loading at construction.
pub trait DetectorBackend: Send {
    /// Backend identifier, used in logs and extractor metadata.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can produce the requested kind.
    fn supports(&self, kind: DetectionKind) -> bool;

    /// Run detection on a frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
