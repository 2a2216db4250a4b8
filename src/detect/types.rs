use std::f64::consts::PI;

/// Number of keypoints in the COCO pose format.
pub const NUM_KEYPOINTS: usize = 17;

/// COCO-17 keypoint indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Keypoint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

/// Axis-aligned person bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    /// Height over width; 0 for a degenerate box.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 {
            return 0.0;
        }
        self.height as f64 / self.width as f64
    }

    pub fn center(&self) -> (i64, i64) {
        (
            self.x + self.width as i64 / 2,
            self.y + self.height as i64 / 2,
        )
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// 17-keypoint skeleton; each entry is `(x, y, visibility)` with x/y in
/// pixel coordinates and visibility in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    pub keypoints: [[f64; 3]; NUM_KEYPOINTS],
}

impl Skeleton {
    pub fn point(&self, kp: Keypoint) -> [f64; 3] {
        self.keypoints[kp as usize]
    }

    pub fn shoulder_center(&self) -> (f64, f64) {
        let ls = self.point(Keypoint::LeftShoulder);
        let rs = self.point(Keypoint::RightShoulder);
        ((ls[0] + rs[0]) / 2.0, (ls[1] + rs[1]) / 2.0)
    }

    pub fn hip_center(&self) -> (f64, f64) {
        let lh = self.point(Keypoint::LeftHip);
        let rh = self.point(Keypoint::RightHip);
        ((lh[0] + rh[0]) / 2.0, (lh[1] + rh[1]) / 2.0)
    }

    /// Angle of the shoulder-to-hip segment from the vertical image axis,
    /// in degrees: 0 = standing upright, 90 = lying horizontal.
    pub fn torso_angle(&self) -> f64 {
        let (sx, sy) = self.shoulder_center();
        let (hx, hy) = self.hip_center();
        let dx = (sx - hx).abs();
        let dy = (sy - hy).abs();
        dx.atan2(dy) * 180.0 / PI
    }
}

/// A single detection from the detector port, most salient first in the
/// backend's output. The pipeline only ever consumes index 0.
#[derive(Clone, Debug)]
pub enum Detection {
    BBox(BBox),
    Skeleton(Skeleton),
}

impl Detection {
    pub fn bbox(&self) -> Option<&BBox> {
        match self {
            Detection::BBox(b) => Some(b),
            Detection::Skeleton(_) => None,
        }
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        match self {
            Detection::Skeleton(s) => Some(s),
            Detection::BBox(_) => None,
        }
    }
}
