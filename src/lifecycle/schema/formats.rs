use serde::{Deserialize, Serialize};

/// Supported keypoint layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypointFormat {
    #[serde(rename = "coco17")]
    Coco17,
    #[serde(rename = "mediapipe33")]
    Mediapipe33,
}

impl KeypointFormat {
    /// Maximum keypoints a frame of this format may carry.
    pub fn capacity(&self) -> usize {
        match self {
            KeypointFormat::Coco17 => COCO17_KEYPOINTS.len(),
            KeypointFormat::Mediapipe33 => MEDIAPIPE33_KEYPOINTS.len(),
        }
    }

    pub fn keypoint_names(&self) -> &'static [&'static str] {
        match self {
            KeypointFormat::Coco17 => COCO17_KEYPOINTS,
            KeypointFormat::Mediapipe33 => MEDIAPIPE33_KEYPOINTS,
        }
    }
}

/// COCO-17 keypoint names in canonical order.
pub const COCO17_KEYPOINTS: &[&str] = &[
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// MediaPipe 33-keypoint names in canonical order.
pub const MEDIAPIPE33_KEYPOINTS: &[&str] = &[
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_match_name_tables() {
        assert_eq!(KeypointFormat::Coco17.capacity(), 17);
        assert_eq!(KeypointFormat::Mediapipe33.capacity(), 33);
    }

    #[test]
    fn serde_names_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&KeypointFormat::Coco17).unwrap(),
            "\"coco17\""
        );
        let parsed: KeypointFormat = serde_json::from_str("\"mediapipe33\"").unwrap();
        assert_eq!(parsed, KeypointFormat::Mediapipe33);
    }
}
