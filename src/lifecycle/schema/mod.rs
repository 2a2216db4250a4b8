//! Skeleton sequence data format.
//!
//! The on-disk JSON document exchanged with training pipelines and the
//! object store. Field layout is stable: coordinates are normalized to
//! `[0, 1]` and round-trip at full f64 precision through `serde_json`.

pub mod formats;
pub mod validator;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use formats::{KeypointFormat, COCO17_KEYPOINTS, MEDIAPIPE33_KEYPOINTS};
pub use validator::validate;

/// One normalized keypoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Person bounding box in absolute pixels, derived from keypoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CenterOfMass {
    pub x: f64,
    pub y: f64,
}

/// Features computed from the skeleton at extraction time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub torso_angle: f64,
    pub aspect_ratio: f64,
    pub center_of_mass: CenterOfMass,
}

/// Skeleton data for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonFrame {
    pub frame_idx: u64,
    pub timestamp: f64,
    pub keypoints: BTreeMap<String, Keypoint>,
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub derived_features: Option<DerivedFeatures>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractorMetadata {
    pub engine: String,
    pub model: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonMetadata {
    pub event_id: String,
    /// ISO-8601 extraction timestamp.
    pub timestamp: String,
    pub source_video: String,
    pub duration_sec: f64,
    pub fps: u32,
    pub total_frames: u64,
    pub extractor: ExtractorMetadata,
}

/// Optional fall-analysis annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonAnalysis {
    pub fall_detected: bool,
    #[serde(default)]
    pub fall_frame_idx: Option<u64>,
    #[serde(default)]
    pub fall_timestamp: Option<f64>,
    #[serde(default)]
    pub recovery_frame_idx: Option<u64>,
    #[serde(default)]
    pub rule_triggered: Option<String>,
}

/// The top-level skeleton sequence document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonSequence {
    pub version: String,
    pub metadata: SkeletonMetadata,
    pub keypoint_format: KeypointFormat,
    pub sequence: Vec<SkeletonFrame>,
    #[serde(default)]
    pub analysis: Option<SkeletonAnalysis>,
}

impl SkeletonSequence {
    pub const VERSION: &'static str = "1.0";

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize skeleton sequence")
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse skeleton sequence")
    }

    /// Write the document, creating parent directories as needed.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_string()?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&raw)
    }
}
