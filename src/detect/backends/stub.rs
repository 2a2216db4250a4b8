use anyhow::Result;

use crate::detect::backend::{DetectionKind, DetectorBackend};
use crate::detect::types::{BBox, Detection, Keypoint, Skeleton, NUM_KEYPOINTS};

/// Luminance threshold separating the figure from the background.
const FIGURE_THRESHOLD: u8 = 128;

/// Tight bounding box over pixels brighter than the threshold.
fn bright_bounds(pixels: &[u8], width: u32, height: u32) -> Option<BBox> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut found = false;
    for y in 0..height {
        for x in 0..width {
            let idx = (y as usize * width as usize + x as usize) * 3;
            if pixels[idx] > FIGURE_THRESHOLD {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    if !found {
        return None;
    }
    Some(BBox {
        x: min_x as i64,
        y: min_y as i64,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Bounding-box stub: segments the bright figure produced by the
/// synthetic camera.
#[derive(Default)]
pub struct StubPersonBackend;

impl StubPersonBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubPersonBackend {
    fn name(&self) -> &'static str {
        "stub-person"
    }

    fn supports(&self, kind: DetectionKind) -> bool {
        matches!(kind, DetectionKind::Person)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        Ok(bright_bounds(pixels, width, height)
            .map(Detection::BBox)
            .into_iter()
            .collect())
    }
}

/// Pose stub: synthesises a plausible COCO-17 skeleton from the figure's
/// bounding box. An upright (tall) figure yields a vertical torso, a
/// lying (wide) figure a horizontal one, so the pose rule sees the same
/// geometry a real pose model would report.
#[derive(Default)]
pub struct StubPoseBackend;

impl StubPoseBackend {
    pub fn new() -> Self {
        Self
    }

    fn skeleton_for(bounds: &BBox) -> Skeleton {
        let mut keypoints = [[0.0f64; 3]; NUM_KEYPOINTS];
        let x = bounds.x as f64;
        let y = bounds.y as f64;
        let w = bounds.width as f64;
        let h = bounds.height as f64;
        let vis = 0.9;

        // Body axis runs along the long side of the box.
        let upright = h >= w;
        let place = |t: f64, lateral: f64| -> (f64, f64) {
            if upright {
                (x + w / 2.0 + lateral * w, y + t * h)
            } else {
                (x + t * w, y + h / 2.0 + lateral * h)
            }
        };

        let mut set = |kp: Keypoint, t: f64, lateral: f64| {
            let (px, py) = place(t, lateral);
            keypoints[kp as usize] = [px, py, vis];
        };

        set(Keypoint::Nose, 0.06, 0.0);
        set(Keypoint::LeftEye, 0.05, -0.08);
        set(Keypoint::RightEye, 0.05, 0.08);
        set(Keypoint::LeftEar, 0.07, -0.14);
        set(Keypoint::RightEar, 0.07, 0.14);
        set(Keypoint::LeftShoulder, 0.2, -0.25);
        set(Keypoint::RightShoulder, 0.2, 0.25);
        set(Keypoint::LeftElbow, 0.35, -0.3);
        set(Keypoint::RightElbow, 0.35, 0.3);
        set(Keypoint::LeftWrist, 0.48, -0.32);
        set(Keypoint::RightWrist, 0.48, 0.32);
        set(Keypoint::LeftHip, 0.55, -0.15);
        set(Keypoint::RightHip, 0.55, 0.15);
        set(Keypoint::LeftKnee, 0.75, -0.15);
        set(Keypoint::RightKnee, 0.75, 0.15);
        set(Keypoint::LeftAnkle, 0.95, -0.15);
        set(Keypoint::RightAnkle, 0.95, 0.15);

        Skeleton { keypoints }
    }
}

impl DetectorBackend for StubPoseBackend {
    fn name(&self) -> &'static str {
        "stub-pose"
    }

    fn supports(&self, kind: DetectionKind) -> bool {
        matches!(kind, DetectionKind::Pose)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        Ok(bright_bounds(pixels, width, height)
            .map(|b| Detection::Skeleton(Self::skeleton_for(&b)))
            .into_iter()
            .collect())
    }
}
