//! Lifecycle integration: retention sweeps against a file-backed store
//! and upload reconciliation through the cloud sync engine.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fallwatch::epoch_now;
use fallwatch::events::store::UploadStatus;
use fallwatch::lifecycle::cleanup::ClipCleanup;
use fallwatch::lifecycle::cloud_sync::{CloudSync, ObjectStore, StoreError, SyncStats};
use fallwatch::lifecycle::scheduler::CleanupScheduler;
use fallwatch::EventStore;

struct FlakyStore {
    failures_before_success: Mutex<u32>,
    calls: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_before_success: Mutex::new(failures),
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl ObjectStore for FlakyStore {
    fn put_json(&self, object_path: &str, _data: &[u8]) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(object_path.to_string());
        let mut remaining = self.failures_before_success.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::Transport("connection reset".into()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "test://bucket".into()
    }
}

fn seed_aged_events(store: &EventStore, dir: &Path, count: usize, age_days: f64) {
    let created_at = epoch_now() - age_days * 86_400.0;
    for i in 0..count {
        let event_id = format!("evt_{}", 1_000_000 + i);
        let clip = dir.join(format!("{}.mp4", event_id));
        std::fs::write(&clip, vec![0u8; 128]).unwrap();
        store
            .insert_or_replace(&event_id, created_at, 1, created_at)
            .unwrap();
        store.set_clip_path(&event_id, &clip.to_string_lossy()).unwrap();
    }
}

#[test]
fn retention_dry_run_then_wet_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let store = Arc::new(EventStore::open(&db_path).unwrap());
    seed_aged_events(&store, dir.path(), 10, 10.0);

    let cleanup = ClipCleanup::new(Arc::clone(&store), 7);

    // Dry run: nothing deleted, nothing changed in the store.
    let stats = cleanup.run(true).unwrap();
    assert_eq!(stats.would_delete_count, 10);
    assert_eq!(stats.deleted_count, 0);
    assert_eq!(
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().map(|x| x == "mp4").unwrap_or(false))
            .count(),
        10
    );
    assert_eq!(store.find_expired_clips(epoch_now()).unwrap().len(), 10);

    // Wet sweep deletes the files and clears the rows.
    let stats = cleanup.run(false).unwrap();
    assert_eq!(stats.deleted_count, 10);
    assert_eq!(stats.freed_bytes, 10 * 128);
    assert!(store.find_expired_clips(epoch_now()).unwrap().is_empty());

    // The rows themselves survive; only clip paths were cleared.
    assert_eq!(store.recent_events(20).unwrap().len(), 10);
}

#[test]
fn scheduler_run_now_uses_the_shared_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let store = Arc::new(EventStore::open(&db_path).unwrap());
    seed_aged_events(&store, dir.path(), 3, 10.0);

    let scheduler = CleanupScheduler::new(
        ClipCleanup::new(Arc::clone(&store), 7),
        Duration::from_secs(3600),
        true,
    );
    let stats = scheduler.run_now().unwrap();
    assert_eq!(stats.deleted_count, 3);
}

#[test]
fn pending_upload_reaches_the_bucket_after_transient_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EventStore::open(dir.path().join("events.db")).unwrap());
    let skeleton_dir = dir.path().join("skeletons");
    std::fs::create_dir_all(&skeleton_dir).unwrap();

    let event_id = "evt_1735459200.000";
    store
        .insert_or_replace(event_id, 1735459200.0, 1, epoch_now())
        .unwrap();
    std::fs::write(
        skeleton_dir.join(format!("{}.json", event_id)),
        b"{\"version\":\"1.0\"}",
    )
    .unwrap();

    let bucket = FlakyStore::new(2);
    let sync = CloudSync::new(
        Arc::clone(&store),
        Arc::clone(&bucket) as Arc<dyn ObjectStore>,
        &skeleton_dir,
        3,
        Duration::from_millis(1),
    );

    let stats = sync.upload_pending(false).unwrap();
    assert_eq!(stats, SyncStats { success: 1, failed: 0 });

    // Exactly three attempts, all aimed at the derived cloud path.
    let calls = bucket.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|p| p == "2024/12/29/evt_1735459200.000.json"));

    let record = store.get(event_id).unwrap().unwrap();
    assert_eq!(record.skeleton_upload_status, UploadStatus::Uploaded);
    assert_eq!(
        record.skeleton_cloud_path.as_deref(),
        Some("2024/12/29/evt_1735459200.000.json")
    );
    assert!(record.skeleton_upload_error.is_none());
}

#[test]
fn failed_upload_is_available_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EventStore::open(dir.path().join("events.db")).unwrap());
    let skeleton_dir = dir.path().join("skeletons");
    std::fs::create_dir_all(&skeleton_dir).unwrap();

    let event_id = "evt_1735459300";
    store
        .insert_or_replace(event_id, 1735459300.0, 1, epoch_now())
        .unwrap();
    std::fs::write(skeleton_dir.join(format!("{}.json", event_id)), b"{}").unwrap();

    // Five failures exhaust the three attempts of the first pass.
    let bucket = FlakyStore::new(5);
    let sync = CloudSync::new(
        Arc::clone(&store),
        Arc::clone(&bucket) as Arc<dyn ObjectStore>,
        &skeleton_dir,
        3,
        Duration::from_millis(1),
    );

    let stats = sync.upload_pending(false).unwrap();
    assert_eq!(stats, SyncStats { success: 0, failed: 1 });
    assert_eq!(
        store.get(event_id).unwrap().unwrap().skeleton_upload_status,
        UploadStatus::Failed
    );

    // retry_failed picks it up; two remaining scripted failures are
    // absorbed by the retry budget and the upload lands.
    let stats = sync.retry_failed(false).unwrap();
    assert_eq!(stats, SyncStats { success: 1, failed: 0 });
    assert_eq!(
        store.get(event_id).unwrap().unwrap().skeleton_upload_status,
        UploadStatus::Uploaded
    );
}
