use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::epoch_now;
use crate::events::observer::{FallEvent, FallEventObserver};

/// Artifact upload state persisted per event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(UploadStatus::Pending),
            "uploaded" => Ok(UploadStatus::Uploaded),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(anyhow!("unknown upload status '{}'", other)),
        }
    }
}

/// One persisted event row.
#[derive(Clone, Debug)]
pub struct EventRecord {
    pub event_id: String,
    pub confirmed_at: f64,
    pub recovered_at: Option<f64>,
    pub notification_count: u32,
    pub clip_path: Option<String>,
    pub skeleton_cloud_path: Option<String>,
    pub skeleton_upload_status: UploadStatus,
    pub skeleton_upload_error: Option<String>,
    pub created_at: f64,
}

/// Expired-clip view used by the retention sweep.
#[derive(Clone, Debug)]
pub struct ExpiredClip {
    pub event_id: String,
    pub clip_path: String,
    pub created_at: f64,
}

/// Per-status row counts for the status CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadStatusCounts {
    pub pending: u64,
    pub uploaded: u64,
    pub failed: u64,
}

/// Durable store of fall events and artifact status.
///
/// A single SQLite file; all access serializes through one mutex around
/// the connection, which is the whole concurrency story: writers (state
/// machine, clip recorder, uploader, retention) block each other briefly
/// and readers never observe partial writes.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS events (
              event_id TEXT PRIMARY KEY,
              confirmed_at REAL NOT NULL,
              recovered_at REAL,
              notification_count INTEGER DEFAULT 1,
              clip_path TEXT,
              skeleton_cloud_path TEXT,
              skeleton_upload_status TEXT DEFAULT 'pending',
              skeleton_upload_error TEXT,
              created_at REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_confirmed ON events(confirmed_at);
            CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("event store lock poisoned"))
    }

    /// Upsert on confirmation. A re-notification for the same event id
    /// refreshes the counter without disturbing `created_at` or any
    /// artifact columns already written.
    pub fn insert_or_replace(
        &self,
        event_id: &str,
        confirmed_at: f64,
        notification_count: u32,
        created_at: f64,
    ) -> Result<()> {
        self.lock()?.execute(
            r#"
            INSERT INTO events (event_id, confirmed_at, notification_count, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(event_id) DO UPDATE SET
              confirmed_at = excluded.confirmed_at,
              notification_count = excluded.notification_count
            "#,
            params![event_id, confirmed_at, notification_count, created_at],
        )?;
        Ok(())
    }

    pub fn set_recovered(&self, event_id: &str, recovered_at: f64) -> Result<()> {
        self.lock()?.execute(
            "UPDATE events SET recovered_at = ?1 WHERE event_id = ?2",
            params![recovered_at, event_id],
        )?;
        Ok(())
    }

    pub fn set_clip_path(&self, event_id: &str, clip_path: &str) -> Result<()> {
        self.lock()?.execute(
            "UPDATE events SET clip_path = ?1 WHERE event_id = ?2",
            params![clip_path, event_id],
        )?;
        Ok(())
    }

    pub fn clear_clip_path(&self, event_id: &str) -> Result<()> {
        self.lock()?.execute(
            "UPDATE events SET clip_path = NULL WHERE event_id = ?1",
            params![event_id],
        )?;
        Ok(())
    }

    pub fn set_upload_status(
        &self,
        event_id: &str,
        cloud_path: Option<&str>,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.lock()?.execute(
            r#"
            UPDATE events
            SET skeleton_cloud_path = ?1,
                skeleton_upload_status = ?2,
                skeleton_upload_error = ?3
            WHERE event_id = ?4
            "#,
            params![cloud_path, status.as_str(), error, event_id],
        )?;
        Ok(())
    }

    pub fn get(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE event_id = ?1",
            Self::SELECT_RECORD_PREFIX
        ))?;
        let record = stmt
            .query_row(params![event_id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    pub fn find_pending_uploads(&self) -> Result<Vec<EventRecord>> {
        self.records_by_status(UploadStatus::Pending)
    }

    pub fn find_failed_uploads(&self) -> Result<Vec<EventRecord>> {
        self.records_by_status(UploadStatus::Failed)
    }

    fn records_by_status(&self, status: UploadStatus) -> Result<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE skeleton_upload_status = ?1 ORDER BY confirmed_at ASC",
            Self::SELECT_RECORD_PREFIX
        ))?;
        let rows = stmt.query_map(params![status.as_str()], Self::row_to_record)?;
        collect_rows(rows)
    }

    /// Rows older than `cutoff_epoch` that still have a clip on disk.
    pub fn find_expired_clips(&self, cutoff_epoch: f64) -> Result<Vec<ExpiredClip>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, clip_path, created_at FROM events
            WHERE created_at < ?1 AND clip_path IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff_epoch], |row| {
            Ok(ExpiredClip {
                event_id: row.get(0)?,
                clip_path: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Most recent events first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY confirmed_at DESC LIMIT ?1",
            Self::SELECT_RECORD_PREFIX
        ))?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_record)?;
        collect_rows(rows)
    }

    pub fn upload_status_counts(&self) -> Result<UploadStatusCounts> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT skeleton_upload_status, COUNT(*) FROM events GROUP BY 1")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = UploadStatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            match UploadStatus::parse(&status)? {
                UploadStatus::Pending => counts.pending = n as u64,
                UploadStatus::Uploaded => counts.uploaded = n as u64,
                UploadStatus::Failed => counts.failed = n as u64,
            }
        }
        Ok(counts)
    }

    const SELECT_RECORD_PREFIX: &'static str = r#"
        SELECT event_id, confirmed_at, recovered_at, notification_count,
               clip_path, skeleton_cloud_path, skeleton_upload_status,
               skeleton_upload_error, created_at
        FROM events"#;

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
        let status: String = row.get(6)?;
        Ok(EventRecord {
            event_id: row.get(0)?,
            confirmed_at: row.get(1)?,
            recovered_at: row.get(2)?,
            notification_count: row.get::<_, i64>(3)? as u32,
            clip_path: row.get(4)?,
            skeleton_cloud_path: row.get(5)?,
            skeleton_upload_status: UploadStatus::parse(&status).unwrap_or(UploadStatus::Pending),
            skeleton_upload_error: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl FallEventObserver for EventStore {
    fn on_fall_confirmed(&self, event: &FallEvent) -> Result<()> {
        self.insert_or_replace(
            &event.event_id,
            event.confirmed_at,
            event.notification_count,
            epoch_now(),
        )
    }

    fn on_fall_recovered(&self, event: &FallEvent) -> Result<()> {
        self.set_recovered(&event.event_id, epoch_now())
    }
}
