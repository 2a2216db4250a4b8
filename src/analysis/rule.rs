use anyhow::Result;

use crate::analysis::smoothing::KeypointSmoother;
use crate::detect::types::{BBox, Detection, Keypoint, Skeleton};

/// Bounding-box fall rule: a fallen person's box is wider than tall.
pub struct BBoxRule {
    fall_threshold: f64,
}

impl BBoxRule {
    pub const DEFAULT_FALL_THRESHOLD: f64 = 1.3;

    pub fn new(fall_threshold: f64) -> Self {
        Self { fall_threshold }
    }

    /// Fallen iff `aspect_ratio < fall_threshold`. No detection is never
    /// a fall.
    pub fn is_fallen(&self, bbox: Option<&BBox>) -> bool {
        match bbox {
            Some(b) => b.aspect_ratio() < self.fall_threshold,
            None => false,
        }
    }
}

impl Default for BBoxRule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FALL_THRESHOLD)
    }
}

/// Pose fall rule: the torso leaning past a threshold angle means the
/// person is down. Optionally smooths keypoints first.
pub struct PoseRule {
    torso_angle_threshold: f64,
    min_visibility: f64,
    smoother: Option<KeypointSmoother>,
}

impl PoseRule {
    pub const DEFAULT_TORSO_ANGLE_THRESHOLD: f64 = 60.0;
    pub const DEFAULT_MIN_VISIBILITY: f64 = 0.3;

    pub fn new(torso_angle_threshold: f64, min_visibility: f64) -> Self {
        Self {
            torso_angle_threshold,
            min_visibility,
            smoother: None,
        }
    }

    /// Enable One Euro keypoint smoothing ahead of the angle check.
    pub fn with_smoothing(mut self, min_cutoff: f64, beta: f64) -> Result<Self> {
        self.smoother = Some(KeypointSmoother::new(
            min_cutoff,
            beta,
            1.0,
            self.min_visibility,
        )?);
        Ok(self)
    }

    fn has_valid_keypoints(&self, skeleton: &Skeleton) -> bool {
        [
            Keypoint::LeftShoulder,
            Keypoint::RightShoulder,
            Keypoint::LeftHip,
            Keypoint::RightHip,
        ]
        .iter()
        .all(|&kp| skeleton.point(kp)[2] >= self.min_visibility)
    }

    fn smoothed(&mut self, skeleton: &Skeleton, timestamp: f64) -> Skeleton {
        match &mut self.smoother {
            Some(smoother) => smoother.smooth(skeleton, timestamp),
            None => skeleton.clone(),
        }
    }

    /// Fallen iff shoulders and hips are all visible and the torso angle
    /// is at or past the threshold. No detection is never a fall.
    pub fn is_fallen(&mut self, skeleton: Option<&Skeleton>, timestamp: f64) -> bool {
        let Some(skeleton) = skeleton else {
            return false;
        };
        let skeleton = self.smoothed(skeleton, timestamp);
        if !self.has_valid_keypoints(&skeleton) {
            return false;
        }
        skeleton.torso_angle() >= self.torso_angle_threshold
    }

    /// Confidence in `[0, 1]` that the pose is a fall: 0 below 30 deg,
    /// ramping to 0.5 at 60 deg and 1.0 at 120 deg.
    pub fn fall_confidence(&self, skeleton: Option<&Skeleton>) -> f64 {
        let Some(skeleton) = skeleton else {
            return 0.0;
        };
        if !self.has_valid_keypoints(skeleton) {
            return 0.0;
        }
        let angle = skeleton.torso_angle();
        if angle < 30.0 {
            0.0
        } else if angle < 60.0 {
            (angle - 30.0) / 60.0
        } else {
            0.5 + ((angle - 60.0) / 120.0).min(0.5)
        }
    }

    /// Drop smoothing history, e.g. after tracking is lost.
    pub fn reset_smoother(&mut self) {
        if let Some(smoother) = &mut self.smoother {
            smoother.reset();
        }
    }
}

impl Default for PoseRule {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_TORSO_ANGLE_THRESHOLD,
            Self::DEFAULT_MIN_VISIBILITY,
        )
    }
}

/// Dispatches the frame verdict by detection kind. Each variant carries
/// its own rule; a detection of the other kind evaluates to false.
pub enum RuleEngine {
    BBox(BBoxRule),
    Pose(PoseRule),
}

impl RuleEngine {
    pub fn evaluate(&mut self, detection: Option<&Detection>, timestamp: f64) -> bool {
        match self {
            RuleEngine::BBox(rule) => rule.is_fallen(detection.and_then(Detection::bbox)),
            RuleEngine::Pose(rule) => {
                rule.is_fallen(detection.and_then(Detection::skeleton), timestamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::types::NUM_KEYPOINTS;

    fn skeleton_at_angle(angle_deg: f64, visibility: f64) -> Skeleton {
        let mut keypoints = [[0.0; 3]; NUM_KEYPOINTS];
        for kp in keypoints.iter_mut() {
            kp[2] = visibility;
        }
        let rad = angle_deg.to_radians();
        let (sx, sy) = (50.0 + 40.0 * rad.sin(), 50.0 - 40.0 * rad.cos());
        keypoints[Keypoint::LeftShoulder as usize] = [sx - 5.0, sy, visibility];
        keypoints[Keypoint::RightShoulder as usize] = [sx + 5.0, sy, visibility];
        keypoints[Keypoint::LeftHip as usize] = [45.0, 50.0, visibility];
        keypoints[Keypoint::RightHip as usize] = [55.0, 50.0, visibility];
        Skeleton { keypoints }
    }

    #[test]
    fn bbox_rule_thresholds() {
        let rule = BBoxRule::default();
        let standing = BBox {
            x: 100,
            y: 50,
            width: 100,
            height: 200,
        };
        let fallen = BBox {
            x: 100,
            y: 50,
            width: 200,
            height: 100,
        };
        assert!(!rule.is_fallen(Some(&standing)));
        assert!(rule.is_fallen(Some(&fallen)));
        assert!(!rule.is_fallen(None));
    }

    #[test]
    fn pose_rule_angle_threshold() {
        let mut rule = PoseRule::default();
        assert!(!rule.is_fallen(Some(&skeleton_at_angle(20.0, 0.9)), 0.0));
        assert!(rule.is_fallen(Some(&skeleton_at_angle(75.0, 0.9)), 0.0));
        assert!(!rule.is_fallen(None, 0.0));
    }

    #[test]
    fn pose_rule_requires_visible_torso() {
        let mut rule = PoseRule::default();
        // Horizontal torso but invisible joints: not a fall.
        assert!(!rule.is_fallen(Some(&skeleton_at_angle(85.0, 0.1)), 0.0));
    }

    #[test]
    fn fall_confidence_ramp() {
        let rule = PoseRule::default();
        let conf = |angle: f64| rule.fall_confidence(Some(&skeleton_at_angle(angle, 0.9)));
        assert_eq!(conf(10.0), 0.0);
        assert!((conf(45.0) - 0.25).abs() < 0.02);
        assert!((conf(60.0) - 0.5).abs() < 0.02);
        // The ramp continues toward 1.0 at 120 degrees; the torso angle
        // itself folds at 90, so 0.75 is the practical ceiling.
        assert!((conf(90.0) - 0.75).abs() < 0.02);
        assert_eq!(rule.fall_confidence(None), 0.0);
    }

    #[test]
    fn rule_engine_ignores_mismatched_detection_kind() {
        let mut engine = RuleEngine::BBox(BBoxRule::default());
        let skeleton = Detection::Skeleton(skeleton_at_angle(90.0, 0.9));
        assert!(!engine.evaluate(Some(&skeleton), 0.0));

        let mut engine = RuleEngine::Pose(PoseRule::default());
        let bbox = Detection::BBox(BBox {
            x: 0,
            y: 0,
            width: 200,
            height: 100,
        });
        assert!(!engine.evaluate(Some(&bbox), 0.0));
    }

    #[test]
    fn smoothing_survives_rule_evaluation() {
        let mut rule = PoseRule::default().with_smoothing(1.0, 0.007).unwrap();
        // First frame initialises the filters; a fallen pose still reads
        // as fallen because the first sample passes through.
        assert!(rule.is_fallen(Some(&skeleton_at_angle(80.0, 0.9)), 0.0));
        assert!(rule.is_fallen(Some(&skeleton_at_angle(80.0, 0.9)), 0.033));
    }
}
