use anyhow::Result;

use crate::capture::frame::FrameImage;
use crate::detect::backend::{DetectionKind, DetectorBackend};
use crate::detect::types::Detection;

/// Front-end over a detection backend.
///
/// The pipeline talks to this type, never to a backend directly. A
/// backend error is downgraded to an empty result with a warning so
/// inference failures never terminate the capture loop.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
    kind: DetectionKind,
}

impl Detector {
    pub fn new(backend: Box<dyn DetectorBackend>, kind: DetectionKind) -> Result<Self> {
        if !backend.supports(kind) {
            anyhow::bail!(
                "backend '{}' does not support {:?} detection",
                backend.name(),
                kind
            );
        }
        Ok(Self { backend, kind })
    }

    pub fn kind(&self) -> DetectionKind {
        self.kind
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Detections ordered most salient first; empty on inference failure.
    pub fn detect(&mut self, image: &FrameImage) -> Vec<Detection> {
        match self
            .backend
            .detect(image.pixels(), image.width, image.height)
        {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("{} inference failed: {:#}", self.backend.name(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::stub::{StubPersonBackend, StubPoseBackend};

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn supports(&self, _kind: DetectionKind) -> bool {
            true
        }
        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            anyhow::bail!("engine exploded")
        }
    }

    #[test]
    fn backend_errors_become_empty_results() {
        let mut detector =
            Detector::new(Box::new(FailingBackend), DetectionKind::Person).unwrap();
        let img = FrameImage::filled(8, 8, [0, 0, 0]);
        assert!(detector.detect(&img).is_empty());
    }

    #[test]
    fn rejects_backend_without_requested_kind() {
        assert!(Detector::new(Box::new(StubPersonBackend::new()), DetectionKind::Pose).is_err());
        assert!(Detector::new(Box::new(StubPoseBackend::new()), DetectionKind::Pose).is_ok());
    }

    #[test]
    fn stub_detector_reports_figure() {
        let mut detector =
            Detector::new(Box::new(StubPersonBackend::new()), DetectionKind::Person).unwrap();
        let mut img = FrameImage::filled(64, 64, [16, 16, 16]);
        img.fill_rect(10, 10, 10, 30, [220, 220, 220]);
        let dets = detector.detect(&img);
        assert_eq!(dets.len(), 1);
        assert!(dets[0].bbox().is_some());
    }
}
