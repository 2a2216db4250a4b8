use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::capture::frame::FrameData;
use crate::detect::detector::Detector;
use crate::detect::types::Skeleton;
use crate::lifecycle::schema::{
    self, BBox, CenterOfMass, DerivedFeatures, ExtractorMetadata, Keypoint, KeypointFormat,
    SkeletonFrame, SkeletonMetadata, SkeletonSequence, COCO17_KEYPOINTS,
};

/// Visibility floor for keypoints that contribute to the derived bbox.
const BBOX_VISIBILITY: f64 = 0.3;

/// Turns a frame snapshot into a labelled skeleton sequence document.
///
/// Runs the pose detector frame by frame, normalizes keypoints by the
/// frame dimensions, and assembles a validated [`SkeletonSequence`].
/// Extraction is CPU-heavy and runs on the collector's worker pool, away
/// from the capture thread.
pub struct SkeletonExtractor {
    detector: Detector,
    model: String,
}

impl SkeletonExtractor {
    pub fn new(detector: Detector, model: &str) -> Self {
        Self {
            detector,
            model: model.to_string(),
        }
    }

    fn metadata(&self, event_id: &str, duration_sec: f64, fps: f64, total: usize) -> SkeletonMetadata {
        SkeletonMetadata {
            event_id: event_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            source_video: "memory".to_string(),
            duration_sec,
            fps: fps.round() as u32,
            total_frames: total as u64,
            extractor: ExtractorMetadata {
                engine: self.detector.backend_name().to_string(),
                model: self.model.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Extract a sequence from buffered frames. An empty snapshot still
    /// yields a well-formed document with an empty sequence.
    pub fn extract_from_frames(
        &mut self,
        frames: &[FrameData],
        event_id: &str,
        fps: f64,
    ) -> Result<SkeletonSequence> {
        let duration_sec = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) if frames.len() > 1 => last.timestamp - first.timestamp,
            _ => 0.0,
        };

        let mut sequence = Vec::new();
        for (idx, frame) in frames.iter().enumerate() {
            let detections = self.detector.detect(&frame.image);
            let Some(skeleton) = detections.first().and_then(|d| d.skeleton()) else {
                continue;
            };
            sequence.push(skeleton_to_frame(
                skeleton,
                idx as u64,
                frame.timestamp,
                frame.image.width,
                frame.image.height,
            ));
        }

        let doc = SkeletonSequence {
            version: SkeletonSequence::VERSION.to_string(),
            metadata: self.metadata(event_id, duration_sec, fps, frames.len()),
            keypoint_format: KeypointFormat::Coco17,
            sequence,
            analysis: None,
        };
        schema::validate(&doc)?;
        Ok(doc)
    }

    /// Extract and write in one step.
    pub fn extract_and_save<P: AsRef<Path>>(
        &mut self,
        frames: &[FrameData],
        event_id: &str,
        fps: f64,
        path: P,
    ) -> Result<()> {
        let doc = self.extract_from_frames(frames, event_id, fps)?;
        doc.to_json_file(path)
    }
}

fn skeleton_to_frame(
    skeleton: &Skeleton,
    frame_idx: u64,
    timestamp: f64,
    width: u32,
    height: u32,
) -> SkeletonFrame {
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);

    let mut keypoints = BTreeMap::new();
    for (i, name) in COCO17_KEYPOINTS.iter().enumerate() {
        let [x, y, conf] = skeleton.keypoints[i];
        keypoints.insert(
            name.to_string(),
            Keypoint {
                x: (x / w).clamp(0.0, 1.0),
                y: (y / h).clamp(0.0, 1.0),
                confidence: conf.clamp(0.0, 1.0),
            },
        );
    }

    // Tight pixel box over sufficiently visible keypoints.
    let visible: Vec<[f64; 3]> = skeleton
        .keypoints
        .iter()
        .filter(|kp| kp[2] > BBOX_VISIBILITY)
        .copied()
        .collect();
    let bbox = if visible.is_empty() {
        None
    } else {
        let min_x = visible.iter().map(|kp| kp[0]).fold(f64::MAX, f64::min);
        let max_x = visible.iter().map(|kp| kp[0]).fold(f64::MIN, f64::max);
        let min_y = visible.iter().map(|kp| kp[1]).fold(f64::MAX, f64::min);
        let max_y = visible.iter().map(|kp| kp[1]).fold(f64::MIN, f64::max);
        Some(BBox {
            x: min_x as i64,
            y: min_y as i64,
            width: (max_x - min_x) as i64,
            height: (max_y - min_y) as i64,
        })
    };

    let aspect_ratio = match &bbox {
        Some(b) if b.width > 0 => b.height as f64 / b.width as f64,
        _ => 0.0,
    };
    let (hip_x, hip_y) = skeleton.hip_center();
    let derived_features = Some(DerivedFeatures {
        torso_angle: skeleton.torso_angle(),
        aspect_ratio,
        center_of_mass: CenterOfMass {
            x: (hip_x / w).clamp(0.0, 1.0),
            y: (hip_y / h).clamp(0.0, 1.0),
        },
    });

    SkeletonFrame {
        frame_idx,
        timestamp,
        keypoints,
        bbox,
        derived_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::FrameImage;
    use crate::detect::backend::DetectionKind;
    use crate::detect::backends::stub::StubPoseBackend;
    use std::sync::Arc;

    fn pose_extractor() -> SkeletonExtractor {
        let detector =
            Detector::new(Box::new(StubPoseBackend::new()), DetectionKind::Pose).unwrap();
        SkeletonExtractor::new(detector, "synthetic")
    }

    fn figure_frames(n: usize) -> Vec<FrameData> {
        (0..n)
            .map(|i| {
                let mut img = FrameImage::filled(96, 96, [16, 16, 16]);
                img.fill_rect(30, 10, 14, 70, [220, 220, 220]);
                FrameData {
                    timestamp: 100.0 + i as f64 / 15.0,
                    image: Arc::new(img),
                    bbox: None,
                }
            })
            .collect()
    }

    #[test]
    fn extracts_normalized_sequence() {
        let mut extractor = pose_extractor();
        let frames = figure_frames(5);
        let doc = extractor
            .extract_from_frames(&frames, "sus_100", 15.0)
            .unwrap();

        assert_eq!(doc.version, "1.0");
        assert_eq!(doc.metadata.event_id, "sus_100");
        assert_eq!(doc.metadata.total_frames, 5);
        assert_eq!(doc.metadata.fps, 15);
        assert_eq!(doc.sequence.len(), 5);
        assert!((doc.metadata.duration_sec - 4.0 / 15.0).abs() < 1e-9);

        let frame = &doc.sequence[0];
        assert_eq!(frame.keypoints.len(), 17);
        for kp in frame.keypoints.values() {
            assert!((0.0..=1.0).contains(&kp.x));
            assert!((0.0..=1.0).contains(&kp.y));
        }
        let bbox = frame.bbox.as_ref().unwrap();
        assert!(bbox.width > 0 && bbox.height > 0);
        let df = frame.derived_features.as_ref().unwrap();
        // Upright figure: near-vertical torso, hips in the frame.
        assert!(df.torso_angle < 10.0);
        assert!(df.center_of_mass.y > 0.0 && df.center_of_mass.y < 1.0);
    }

    #[test]
    fn empty_snapshot_yields_empty_document() {
        let mut extractor = pose_extractor();
        let doc = extractor.extract_from_frames(&[], "sus_0", 15.0).unwrap();
        assert!(doc.sequence.is_empty());
        assert_eq!(doc.metadata.total_frames, 0);
        assert_eq!(doc.metadata.duration_sec, 0.0);
    }

    #[test]
    fn frames_without_detections_are_skipped() {
        let mut extractor = pose_extractor();
        let mut frames = figure_frames(2);
        frames.push(FrameData {
            timestamp: 101.0,
            image: Arc::new(FrameImage::filled(96, 96, [16, 16, 16])),
            bbox: None,
        });
        let doc = extractor
            .extract_from_frames(&frames, "sus_100", 15.0)
            .unwrap();
        assert_eq!(doc.metadata.total_frames, 3);
        assert_eq!(doc.sequence.len(), 2);
    }

    #[test]
    fn extract_and_save_writes_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skeletons/sus_100_confirmed.json");
        let mut extractor = pose_extractor();
        extractor
            .extract_and_save(&figure_frames(3), "sus_100", 15.0, &path)
            .unwrap();
        let doc = SkeletonSequence::from_json_file(&path).unwrap();
        schema::validate(&doc).unwrap();
        assert_eq!(doc.sequence.len(), 3);
    }
}
