//! Semantic validation for outgoing skeleton documents.
//!
//! Structural validity comes from the typed deserialization; these checks
//! enforce the sequence invariants that types alone cannot express.

use anyhow::{anyhow, Result};

use crate::lifecycle::schema::SkeletonSequence;

/// Validate a document before it is written or uploaded.
pub fn validate(seq: &SkeletonSequence) -> Result<()> {
    let capacity = seq.keypoint_format.capacity();

    if seq.sequence.len() as u64 > seq.metadata.total_frames {
        return Err(anyhow!(
            "sequence length ({}) exceeds total_frames ({})",
            seq.sequence.len(),
            seq.metadata.total_frames
        ));
    }

    let mut prev_idx: Option<u64> = None;
    let mut prev_ts: Option<f64> = None;
    for frame in &seq.sequence {
        if let Some(prev) = prev_idx {
            if frame.frame_idx <= prev {
                return Err(anyhow!(
                    "frame indices are not strictly ascending: {} after {}",
                    frame.frame_idx,
                    prev
                ));
            }
        }
        prev_idx = Some(frame.frame_idx);

        if let Some(prev) = prev_ts {
            if frame.timestamp < prev {
                return Err(anyhow!(
                    "timestamps are not monotonic: frame {} has {} after {}",
                    frame.frame_idx,
                    frame.timestamp,
                    prev
                ));
            }
        }
        prev_ts = Some(frame.timestamp);

        if frame.keypoints.len() > capacity {
            return Err(anyhow!(
                "frame {}: keypoint count ({}) exceeds {:?} capacity ({})",
                frame.frame_idx,
                frame.keypoints.len(),
                seq.keypoint_format,
                capacity
            ));
        }
        for (name, kp) in &frame.keypoints {
            if !(0.0..=1.0).contains(&kp.x) || !(0.0..=1.0).contains(&kp.y) {
                return Err(anyhow!(
                    "frame {}: keypoint '{}' coordinates ({}, {}) outside [0, 1]",
                    frame.frame_idx,
                    name,
                    kp.x,
                    kp.y
                ));
            }
            if !(0.0..=1.0).contains(&kp.confidence) {
                return Err(anyhow!(
                    "frame {}: keypoint '{}' confidence {} outside [0, 1]",
                    frame.frame_idx,
                    name,
                    kp.confidence
                ));
            }
        }
    }

    if let Some(analysis) = &seq.analysis {
        if let (Some(fall_idx), Some(max_idx)) = (analysis.fall_frame_idx, prev_idx) {
            if fall_idx > max_idx {
                return Err(anyhow!(
                    "analysis.fall_frame_idx ({}) exceeds maximum frame index ({})",
                    fall_idx,
                    max_idx
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::schema::{Keypoint, SkeletonAnalysis};

    fn sample() -> SkeletonSequence {
        crate::lifecycle::schema::tests::sample_sequence()
    }

    #[test]
    fn accepts_well_formed_document() {
        validate(&sample()).unwrap();
    }

    #[test]
    fn accepts_empty_sequence() {
        let mut seq = sample();
        seq.sequence.clear();
        validate(&seq).unwrap();
    }

    #[test]
    fn rejects_non_ascending_frame_indices() {
        let mut seq = sample();
        seq.sequence[1].frame_idx = 0;
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("strictly ascending"));
    }

    #[test]
    fn rejects_regressing_timestamps() {
        let mut seq = sample();
        seq.sequence[1].timestamp = 50.0;
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("monotonic"));
    }

    #[test]
    fn rejects_excess_keypoints() {
        let mut seq = sample();
        for i in 0..2 {
            seq.sequence[0].keypoints.insert(
                format!("extra_{}", i),
                Keypoint {
                    x: 0.5,
                    y: 0.5,
                    confidence: 0.5,
                },
            );
        }
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("capacity"));
    }

    #[test]
    fn rejects_denormalized_coordinates() {
        let mut seq = sample();
        seq.sequence[0]
            .keypoints
            .insert("nose".into(), Keypoint { x: 1.5, y: 0.5, confidence: 0.5 });
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("outside [0, 1]"));
    }

    #[test]
    fn rejects_sequence_longer_than_total_frames() {
        let mut seq = sample();
        seq.metadata.total_frames = 1;
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("total_frames"));
    }

    #[test]
    fn rejects_out_of_range_fall_frame_idx() {
        let mut seq = sample();
        seq.analysis = Some(SkeletonAnalysis {
            fall_detected: true,
            fall_frame_idx: Some(99),
            fall_timestamp: None,
            recovery_frame_idx: None,
            rule_triggered: None,
        });
        let err = validate(&seq).unwrap_err().to_string();
        assert!(err.contains("fall_frame_idx"));
    }
}
