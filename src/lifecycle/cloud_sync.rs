use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::events::store::{EventStore, UploadStatus};
use crate::{parse_event_epoch, StopSignal};

/// Object-store failure, classified for the retry policy.
#[derive(Clone, Debug)]
pub enum StoreError {
    /// Network or server-side trouble; worth retrying.
    Transport(String),
    /// Credential rejection; retrying cannot help.
    Auth(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "transport error: {}", msg),
            StoreError::Auth(msg) => write!(f, "authentication error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Destination for JSON artifacts.
pub trait ObjectStore: Send + Sync {
    fn put_json(&self, object_path: &str, data: &[u8]) -> std::result::Result<(), StoreError>;

    /// Human-readable destination for logs (`gs://bucket`).
    fn describe(&self) -> String;
}

/// Google Cloud Storage client over the JSON upload API.
///
/// The bearer token comes from `FALLWATCH_GCS_TOKEN`; 401/403 responses
/// classify as authentication failures, everything else as transport.
pub struct GcsStore {
    bucket: String,
    token: Option<String>,
    endpoint: String,
}

impl GcsStore {
    pub const TOKEN_ENV: &'static str = "FALLWATCH_GCS_TOKEN";

    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            token: std::env::var(Self::TOKEN_ENV).ok(),
            endpoint: "https://storage.googleapis.com/upload/storage/v1/b".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }
}

impl ObjectStore for GcsStore {
    fn put_json(&self, object_path: &str, data: &[u8]) -> std::result::Result<(), StoreError> {
        let url = format!(
            "{}/{}/o?uploadType=media&name={}",
            self.endpoint,
            self.bucket,
            object_path.replace('/', "%2F")
        );
        let mut request = ureq::post(&url).set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        match request.send_bytes(data) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                Err(StoreError::Auth(format!("object store returned {}", code)))
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(StoreError::Transport(format!("object store returned {}", code)))
            }
            Err(e) => Err(StoreError::Transport(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}

/// Aggregate result of a batch operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub success: u64,
    pub failed: u64,
}

/// At-least-once delivery of skeleton artifacts to an object store.
///
/// Every event persisted as PENDING is eventually attempted; transport
/// errors retry up to `retry_attempts` total attempts with interruptible
/// sleeps in between, and terminal outcomes are written back to the
/// event store.
pub struct CloudSync {
    store: Arc<EventStore>,
    object_store: Arc<dyn ObjectStore>,
    skeleton_dir: PathBuf,
    retry_attempts: u32,
    retry_delay: Duration,
    stop: Arc<StopSignal>,
}

impl CloudSync {
    pub fn new(
        store: Arc<EventStore>,
        object_store: Arc<dyn ObjectStore>,
        skeleton_dir: impl Into<PathBuf>,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            object_store,
            skeleton_dir: skeleton_dir.into(),
            retry_attempts: retry_attempts.max(1),
            retry_delay,
            stop: Arc::new(StopSignal::new()),
        }
    }

    /// Share a stop signal so retry sleeps abort on shutdown.
    pub fn with_stop(mut self, stop: Arc<StopSignal>) -> Self {
        self.stop = stop;
        self
    }

    /// `YYYY/MM/DD/<event_id>.json`, with the date taken from the epoch
    /// embedded in the event id (UTC).
    pub fn cloud_path_for(event_id: &str) -> Result<String> {
        let epoch = parse_event_epoch(event_id)?;
        let secs = epoch.floor() as i64;
        let nanos = ((epoch - secs as f64) * 1e9) as u32;
        let dt: DateTime<Utc> = DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| anyhow::anyhow!("event id '{}' timestamp out of range", event_id))?;
        Ok(format!("{}/{}.json", dt.format("%Y/%m/%d"), event_id))
    }

    fn mark_failed(&self, event_id: &str, error: &str) -> bool {
        if let Err(e) = self
            .store
            .set_upload_status(event_id, None, UploadStatus::Failed, Some(error))
        {
            log::error!("failed to record upload failure for {}: {:#}", event_id, e);
        }
        false
    }

    /// Upload one artifact. Returns true on success (or dry-run).
    pub fn upload(&self, event_id: &str, local_path: &Path, dry_run: bool) -> bool {
        if !local_path.exists() {
            return self.mark_failed(
                event_id,
                &format!("local file not found: {}", local_path.display()),
            );
        }

        let cloud_path = match Self::cloud_path_for(event_id) {
            Ok(path) => path,
            Err(e) => return self.mark_failed(event_id, &format!("{:#}", e)),
        };

        if dry_run {
            log::info!(
                "dry-run: would upload {} to {}/{}",
                local_path.display(),
                self.object_store.describe(),
                cloud_path
            );
            return true;
        }

        let data = match std::fs::read(local_path) {
            Ok(data) => data,
            Err(e) => {
                return self.mark_failed(
                    event_id,
                    &format!("cannot read {}: {}", local_path.display(), e),
                )
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=self.retry_attempts {
            match self.object_store.put_json(&cloud_path, &data) {
                Ok(()) => {
                    if let Err(e) = self.store.set_upload_status(
                        event_id,
                        Some(&cloud_path),
                        UploadStatus::Uploaded,
                        None,
                    ) {
                        log::error!("failed to record upload for {}: {:#}", event_id, e);
                    }
                    log::info!(
                        "uploaded {} to {}/{}",
                        event_id,
                        self.object_store.describe(),
                        cloud_path
                    );
                    return true;
                }
                Err(StoreError::Auth(msg)) => {
                    return self.mark_failed(event_id, &format!("authentication error: {}", msg));
                }
                Err(StoreError::Transport(msg)) => {
                    log::warn!(
                        "upload attempt {}/{} for {} failed: {}",
                        attempt,
                        self.retry_attempts,
                        event_id,
                        msg
                    );
                    last_error = msg;
                    if attempt < self.retry_attempts && self.stop.wait_timeout(self.retry_delay) {
                        // Shutting down; record what we know and stop.
                        break;
                    }
                }
            }
        }

        self.mark_failed(
            event_id,
            &format!(
                "upload failed after {} attempts: {}",
                self.retry_attempts, last_error
            ),
        )
    }

    fn upload_batch(&self, rows: Vec<crate::events::store::EventRecord>, dry_run: bool) -> SyncStats {
        let mut stats = SyncStats::default();
        for row in rows {
            if self.stop.is_stopped() {
                break;
            }
            let local_path = self.skeleton_dir.join(format!("{}.json", row.event_id));
            if self.upload(&row.event_id, &local_path, dry_run) {
                stats.success += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    /// Upload everything still PENDING, oldest first.
    pub fn upload_pending(&self, dry_run: bool) -> Result<SyncStats> {
        Ok(self.upload_batch(self.store.find_pending_uploads()?, dry_run))
    }

    /// Re-attempt everything marked FAILED, oldest first.
    pub fn retry_failed(&self, dry_run: bool) -> Result<SyncStats> {
        Ok(self.upload_batch(self.store.find_failed_uploads()?, dry_run))
    }

    /// Background worker draining the pending queue on an interval.
    /// Stoppable mid-sleep via the shared stop signal.
    pub fn spawn_worker(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            if self.stop.wait_timeout(interval) {
                return;
            }
            match self.upload_pending(false) {
                Ok(stats) if stats.success + stats.failed > 0 => {
                    log::info!(
                        "upload sweep: {} succeeded, {} failed",
                        stats.success,
                        stats.failed
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("upload sweep failed: {:#}", e),
            }
        })
    }
}
