use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;

const DEFAULT_DB_PATH: &str = "data/fallwatch.db";
const DEFAULT_CLIPS_DIR: &str = "data/clips";
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_CAMERA_RESOLUTION: [u32; 2] = [640, 480];
const DEFAULT_DETECTION_MODEL: &str = "yolov8n.onnx";
const DEFAULT_POSE_MODEL: &str = "yolov8n-pose.onnx";
const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_FALL_THRESHOLD: f64 = 1.3;
const DEFAULT_DELAY_SEC: f64 = 3.0;
const DEFAULT_SAME_EVENT_WINDOW: f64 = 60.0;
const DEFAULT_RE_NOTIFY_INTERVAL: f64 = 120.0;
const DEFAULT_BUFFER_SECONDS: f64 = 10.0;
const DEFAULT_CLIP_BEFORE_SEC: f64 = 5.0;
const DEFAULT_CLIP_AFTER_SEC: f64 = 5.0;
const DEFAULT_SMOOTHING_MIN_CUTOFF: f64 = 1.0;
const DEFAULT_SMOOTHING_BETA: f64 = 0.007;
const DEFAULT_CLIP_RETENTION_DAYS: u32 = 7;
const DEFAULT_SKELETON_RETENTION_DAYS: u32 = 30;
const DEFAULT_CLEANUP_SCHEDULE_HOURS: f64 = 24.0;
const DEFAULT_SKELETON_OUTPUT_DIR: &str = "data/skeletons";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECONDS: f64 = 5.0;

fn config_or<T>(value: Option<T>, default: T) -> T {
    value.unwrap_or(default)
}

fn config_string(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

/// Camera input selector: device index or stream URI.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CameraSource {
    Index(u32),
    Uri(String),
}

impl Default for CameraSource {
    fn default() -> Self {
        CameraSource::Index(0)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    db_path: Option<String>,
    clips_dir: Option<String>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    analysis: Option<AnalysisConfigFile>,
    recording: Option<RecordingConfigFile>,
    notification: Option<NotificationConfigFile>,
    lifecycle: Option<LifecycleConfigFile>,
    cloud_sync: Option<CloudSyncConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<CameraSource>,
    fps: Option<u32>,
    resolution: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    model: Option<String>,
    pose_model: Option<String>,
    confidence: Option<f64>,
    classes: Option<Vec<i64>>,
    use_pose: Option<bool>,
    enable_smoothing: Option<bool>,
    smoothing_min_cutoff: Option<f64>,
    smoothing_beta: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisConfigFile {
    fall_threshold: Option<f64>,
    delay_sec: Option<f64>,
    same_event_window: Option<f64>,
    re_notify_interval: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    buffer_seconds: Option<f64>,
    clip_before_sec: Option<f64>,
    clip_after_sec: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotificationConfigFile {
    channel_access_token: Option<String>,
    user_id: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct LifecycleConfigFile {
    clip_retention_days: Option<u32>,
    skeleton_retention_days: Option<u32>,
    cleanup_enabled: Option<bool>,
    cleanup_schedule_hours: Option<f64>,
    auto_skeleton_extract: Option<bool>,
    skeleton_output_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CloudSyncConfigFile {
    enabled: Option<bool>,
    gcs_bucket: Option<String>,
    upload_on_extract: Option<bool>,
    retry_attempts: Option<u32>,
    retry_delay_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source: CameraSource,
    pub fps: u32,
    pub resolution: [u32; 2],
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub model: String,
    pub pose_model: String,
    pub confidence: f64,
    pub classes: Vec<i64>,
    pub use_pose: bool,
    pub enable_smoothing: bool,
    pub smoothing_min_cutoff: f64,
    pub smoothing_beta: f64,
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub fall_threshold: f64,
    pub delay_sec: f64,
    pub same_event_window: f64,
    pub re_notify_interval: f64,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub buffer_seconds: f64,
    pub clip_before_sec: f64,
    pub clip_after_sec: f64,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub channel_access_token: String,
    pub user_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub clip_retention_days: u32,
    pub skeleton_retention_days: u32,
    pub cleanup_enabled: bool,
    pub cleanup_schedule_hours: f64,
    pub auto_skeleton_extract: bool,
    pub skeleton_output_dir: String,
}

#[derive(Debug, Clone)]
pub struct CloudSyncSettings {
    pub enabled: bool,
    pub gcs_bucket: String,
    pub upload_on_extract: bool,
    pub retry_attempts: u32,
    pub retry_delay_seconds: f64,
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct FallwatchConfig {
    pub db_path: String,
    pub clips_dir: String,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub analysis: AnalysisSettings,
    pub recording: RecordingSettings,
    pub notification: NotificationSettings,
    pub lifecycle: LifecycleSettings,
    pub cloud_sync: CloudSyncSettings,
}

impl FallwatchConfig {
    /// Load from `FALLWATCH_CONFIG` (or defaults when unset), apply
    /// environment overrides, and validate. Configuration problems are
    /// fatal at startup.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let analysis = file.analysis.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();
        let notification = file.notification.unwrap_or_default();
        let lifecycle = file.lifecycle.unwrap_or_default();
        let cloud_sync = file.cloud_sync.unwrap_or_default();

        Self {
            db_path: config_string(file.db_path, DEFAULT_DB_PATH),
            clips_dir: config_string(file.clips_dir, DEFAULT_CLIPS_DIR),
            camera: CameraSettings {
                source: camera.source.unwrap_or_default(),
                fps: config_or(camera.fps, DEFAULT_CAMERA_FPS),
                resolution: config_or(camera.resolution, DEFAULT_CAMERA_RESOLUTION),
            },
            detection: DetectionSettings {
                model: config_string(detection.model, DEFAULT_DETECTION_MODEL),
                pose_model: config_string(detection.pose_model, DEFAULT_POSE_MODEL),
                confidence: config_or(detection.confidence, DEFAULT_CONFIDENCE),
                classes: detection.classes.unwrap_or_else(|| vec![0]),
                use_pose: config_or(detection.use_pose, false),
                enable_smoothing: config_or(detection.enable_smoothing, false),
                smoothing_min_cutoff: config_or(
                    detection.smoothing_min_cutoff,
                    DEFAULT_SMOOTHING_MIN_CUTOFF,
                ),
                smoothing_beta: config_or(detection.smoothing_beta, DEFAULT_SMOOTHING_BETA),
            },
            analysis: AnalysisSettings {
                fall_threshold: config_or(analysis.fall_threshold, DEFAULT_FALL_THRESHOLD),
                delay_sec: config_or(analysis.delay_sec, DEFAULT_DELAY_SEC),
                same_event_window: config_or(analysis.same_event_window, DEFAULT_SAME_EVENT_WINDOW),
                re_notify_interval: config_or(
                    analysis.re_notify_interval,
                    DEFAULT_RE_NOTIFY_INTERVAL,
                ),
            },
            recording: RecordingSettings {
                buffer_seconds: config_or(recording.buffer_seconds, DEFAULT_BUFFER_SECONDS),
                clip_before_sec: config_or(recording.clip_before_sec, DEFAULT_CLIP_BEFORE_SEC),
                clip_after_sec: config_or(recording.clip_after_sec, DEFAULT_CLIP_AFTER_SEC),
            },
            notification: NotificationSettings {
                channel_access_token: notification.channel_access_token.unwrap_or_default(),
                user_id: notification.user_id.unwrap_or_default(),
                enabled: config_or(notification.enabled, false),
            },
            lifecycle: LifecycleSettings {
                clip_retention_days: config_or(
                    lifecycle.clip_retention_days,
                    DEFAULT_CLIP_RETENTION_DAYS,
                ),
                skeleton_retention_days: config_or(
                    lifecycle.skeleton_retention_days,
                    DEFAULT_SKELETON_RETENTION_DAYS,
                ),
                cleanup_enabled: config_or(lifecycle.cleanup_enabled, true),
                cleanup_schedule_hours: config_or(
                    lifecycle.cleanup_schedule_hours,
                    DEFAULT_CLEANUP_SCHEDULE_HOURS,
                ),
                auto_skeleton_extract: config_or(lifecycle.auto_skeleton_extract, true),
                skeleton_output_dir: config_string(
                    lifecycle.skeleton_output_dir,
                    DEFAULT_SKELETON_OUTPUT_DIR,
                ),
            },
            cloud_sync: CloudSyncSettings {
                enabled: config_or(cloud_sync.enabled, false),
                gcs_bucket: cloud_sync.gcs_bucket.unwrap_or_default(),
                upload_on_extract: config_or(cloud_sync.upload_on_extract, false),
                retry_attempts: config_or(cloud_sync.retry_attempts, DEFAULT_RETRY_ATTEMPTS),
                retry_delay_seconds: config_or(
                    cloud_sync.retry_delay_seconds,
                    DEFAULT_RETRY_DELAY_SECONDS,
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("FALLWATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(dir) = std::env::var("FALLWATCH_CLIPS_DIR") {
            if !dir.trim().is_empty() {
                self.clips_dir = dir;
            }
        }
        if let Ok(dir) = std::env::var("FALLWATCH_SKELETON_DIR") {
            if !dir.trim().is_empty() {
                self.lifecycle.skeleton_output_dir = dir;
            }
        }
        if let Ok(bucket) = std::env::var("FALLWATCH_GCS_BUCKET") {
            if !bucket.trim().is_empty() {
                self.cloud_sync.gcs_bucket = bucket;
            }
        }
        if let Ok(token) = std::env::var("FALLWATCH_NOTIFY_TOKEN") {
            if !token.trim().is_empty() {
                self.notification.channel_access_token = token;
            }
        }
        if let Ok(days) = std::env::var("FALLWATCH_CLIP_RETENTION_DAYS") {
            if !days.trim().is_empty() {
                self.lifecycle.clip_retention_days = days
                    .parse()
                    .map_err(|_| anyhow!("FALLWATCH_CLIP_RETENTION_DAYS must be an integer"))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.fps == 0 {
            return Err(anyhow!("camera.fps must be greater than zero"));
        }
        if self.camera.resolution[0] == 0 || self.camera.resolution[1] == 0 {
            return Err(anyhow!("camera.resolution must be positive"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(anyhow!("detection.confidence must be within 0..=1"));
        }
        if self.detection.enable_smoothing && self.detection.smoothing_min_cutoff <= 0.0 {
            return Err(anyhow!(
                "detection.smoothing_min_cutoff must be positive when smoothing is enabled"
            ));
        }
        if self.analysis.delay_sec < 0.0 {
            return Err(anyhow!("analysis.delay_sec must not be negative"));
        }
        if self.recording.buffer_seconds <= 0.0 {
            return Err(anyhow!("recording.buffer_seconds must be positive"));
        }
        if self.recording.clip_before_sec < 0.0 || self.recording.clip_after_sec < 0.0 {
            return Err(anyhow!("recording clip window must not be negative"));
        }
        if self.lifecycle.clip_retention_days == 0 {
            return Err(anyhow!("lifecycle.clip_retention_days must be at least 1"));
        }
        if self.lifecycle.cleanup_schedule_hours <= 0.0 {
            return Err(anyhow!("lifecycle.cleanup_schedule_hours must be positive"));
        }
        if self.notification.enabled
            && (self.notification.channel_access_token.trim().is_empty()
                || self.notification.user_id.trim().is_empty())
        {
            return Err(anyhow!(
                "notification.enabled requires channel_access_token and user_id"
            ));
        }
        if self.cloud_sync.enabled && self.cloud_sync.gcs_bucket.trim().is_empty() {
            return Err(anyhow!("cloud_sync.enabled requires cloud_sync.gcs_bucket"));
        }
        if self.cloud_sync.retry_attempts == 0 {
            return Err(anyhow!("cloud_sync.retry_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Replace every `${VAR}` in the raw config text with the value of the
/// corresponding environment variable. Unresolved variables are fatal.
fn substitute_env_vars(raw: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    let mut missing: BTreeSet<String> = BTreeSet::new();
    let substituted = re.replace_all(raw, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.insert(name.to_string());
                String::new()
            }
        }
    });
    if !missing.is_empty() {
        return Err(anyhow!(
            "unresolved environment variables in config: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    Ok(substituted.into_owned())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let raw = substitute_env_vars(&raw)?;

    let cfg = if path.extension().map(|e| e == "toml").unwrap_or(false) {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid TOML config file {}: {}", path.display(), e))?
    } else if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid JSON config file {}: {}", path.display(), e))?
    } else {
        match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(json_err) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(toml_err) => {
                    return Err(anyhow!(
                        "invalid config file {} (tried JSON and TOML): json error: {}; toml error: {}",
                        path.display(),
                        json_err,
                        toml_err
                    ));
                }
            },
        }
    };
    Ok(cfg)
}
