use anyhow::Result;

use crate::analysis::smoothing::one_euro::OneEuroFilter;
use crate::detect::types::{Keypoint, Skeleton, NUM_KEYPOINTS};

/// Per-keypoint One Euro smoothing for COCO-17 skeletons.
///
/// Each keypoint's x and y coordinates get independent filters. Keypoints
/// below the confidence threshold reset their filters and pass through
/// unsmoothed, so a re-appearing joint does not get dragged toward its
/// stale history.
pub struct KeypointSmoother {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    confidence_threshold: f64,
    filters_x: Vec<OneEuroFilter>,
    filters_y: Vec<OneEuroFilter>,
    initialized: [bool; NUM_KEYPOINTS],
}

impl KeypointSmoother {
    pub fn new(
        min_cutoff: f64,
        beta: f64,
        d_cutoff: f64,
        confidence_threshold: f64,
    ) -> Result<Self> {
        let mut filters_x = Vec::with_capacity(NUM_KEYPOINTS);
        let mut filters_y = Vec::with_capacity(NUM_KEYPOINTS);
        for _ in 0..NUM_KEYPOINTS {
            filters_x.push(OneEuroFilter::new(min_cutoff, beta, d_cutoff)?);
            filters_y.push(OneEuroFilter::new(min_cutoff, beta, d_cutoff)?);
        }
        Ok(Self {
            min_cutoff,
            beta,
            d_cutoff,
            confidence_threshold,
            filters_x,
            filters_y,
            initialized: [false; NUM_KEYPOINTS],
        })
    }

    /// Smooth a skeleton captured at `timestamp` (seconds).
    pub fn smooth(&mut self, skeleton: &Skeleton, timestamp: f64) -> Skeleton {
        let mut keypoints = skeleton.keypoints;
        for (i, kp) in keypoints.iter_mut().enumerate() {
            let [x, y, conf] = *kp;
            if conf < self.confidence_threshold {
                if self.initialized[i] {
                    self.filters_x[i].reset();
                    self.filters_y[i].reset();
                    self.initialized[i] = false;
                }
                continue;
            }
            kp[0] = self.filters_x[i].filter(x, timestamp);
            kp[1] = self.filters_y[i].filter(y, timestamp);
            self.initialized[i] = true;
        }
        Skeleton { keypoints }
    }

    /// Reset all filters for a new tracking session.
    pub fn reset(&mut self) {
        for i in 0..NUM_KEYPOINTS {
            self.filters_x[i] = OneEuroFilter::new(self.min_cutoff, self.beta, self.d_cutoff)
                .expect("cutoffs validated at construction");
            self.filters_y[i] = OneEuroFilter::new(self.min_cutoff, self.beta, self.d_cutoff)
                .expect("cutoffs validated at construction");
        }
        self.initialized = [false; NUM_KEYPOINTS];
    }

    /// Reset the filters of a single keypoint.
    pub fn reset_keypoint(&mut self, keypoint: Keypoint) {
        let idx = keypoint as usize;
        self.filters_x[idx].reset();
        self.filters_y[idx].reset();
        self.initialized[idx] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_skeleton(x: f64, y: f64, conf: f64) -> Skeleton {
        Skeleton {
            keypoints: [[x, y, conf]; NUM_KEYPOINTS],
        }
    }

    #[test]
    fn rejects_invalid_cutoffs() {
        assert!(KeypointSmoother::new(0.0, 0.007, 1.0, 0.3).is_err());
        assert!(KeypointSmoother::new(1.0, 0.007, -1.0, 0.3).is_err());
        assert!(KeypointSmoother::new(1.0, 0.007, 1.0, 0.3).is_ok());
    }

    #[test]
    fn first_sample_passes_through_and_stationary_stays_put() {
        let mut smoother = KeypointSmoother::new(1.0, 0.007, 1.0, 0.3).unwrap();
        let skeleton = uniform_skeleton(120.0, 200.0, 0.8);
        let first = smoother.smooth(&skeleton, 0.0);
        assert_eq!(first.keypoints[0], [120.0, 200.0, 0.8]);
        for i in 1..10 {
            let out = smoother.smooth(&skeleton, i as f64 / 30.0);
            assert!((out.keypoints[5][0] - 120.0).abs() < 1e-9);
            assert!((out.keypoints[5][1] - 200.0).abs() < 1e-9);
        }
    }

    #[test]
    fn low_confidence_keypoints_pass_through_raw() {
        let mut smoother = KeypointSmoother::new(1.0, 0.007, 1.0, 0.3).unwrap();
        smoother.smooth(&uniform_skeleton(100.0, 100.0, 0.8), 0.0);
        let mut noisy = uniform_skeleton(500.0, 500.0, 0.8);
        noisy.keypoints[3] = [500.0, 500.0, 0.1];
        let out = smoother.smooth(&noisy, 1.0 / 30.0);
        // Filtered keypoints lag behind the jump; the low-confidence one
        // passes through unchanged.
        assert!(out.keypoints[0][0] < 500.0);
        assert_eq!(out.keypoints[3], [500.0, 500.0, 0.1]);
    }

    #[test]
    fn low_confidence_resets_history() {
        let mut smoother = KeypointSmoother::new(1.0, 0.007, 1.0, 0.3).unwrap();
        smoother.smooth(&uniform_skeleton(100.0, 100.0, 0.8), 0.0);
        smoother.smooth(&uniform_skeleton(100.0, 100.0, 0.1), 1.0 / 30.0);
        // After the reset the next confident sample passes through as a
        // first sample would.
        let out = smoother.smooth(&uniform_skeleton(400.0, 400.0, 0.8), 2.0 / 30.0);
        assert_eq!(out.keypoints[0][0], 400.0);
    }

    #[test]
    fn reset_and_reset_keypoint_clear_state() {
        let mut smoother = KeypointSmoother::new(1.0, 0.007, 1.0, 0.3).unwrap();
        smoother.smooth(&uniform_skeleton(100.0, 100.0, 0.8), 0.0);
        smoother.reset_keypoint(Keypoint::Nose);
        let out = smoother.smooth(&uniform_skeleton(300.0, 300.0, 0.8), 1.0 / 30.0);
        assert_eq!(out.keypoints[Keypoint::Nose as usize][0], 300.0);
        assert!(out.keypoints[Keypoint::LeftShoulder as usize][0] < 300.0);

        smoother.reset();
        let out = smoother.smooth(&uniform_skeleton(700.0, 700.0, 0.8), 2.0 / 30.0);
        assert_eq!(out.keypoints[10], [700.0, 700.0, 0.8]);
    }
}
