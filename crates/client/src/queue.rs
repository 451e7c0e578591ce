//! Offline-first submission queue persisted in SQLite.
//!
//! This module provides an `OfflineQueue` that stores not-yet-confirmed trip
//! submissions in a durable SQLite table (`trip_queue`). A record lives in
//! the queue from the moment a submission cannot be confirmed remotely until
//! its remote write succeeds, and survives process restarts.
//!
//! The persisted table is the single source of truth for pending work: every
//! mutator returns the freshly persisted queue so callers adopt it instead of
//! patching their own in-memory copy.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};

use tripdesk_core::TripId;
use tripdesk_trips::TripReportInput;

/// Status of a queued record. A deliberate subset of the entry's sync
/// status: a `synced` record has no business being in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(anyhow::anyhow!("unknown queue status '{}'", other)),
        }
    }
}

/// Durable photo payload carried by a queue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPhoto {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub base64: String,
}

/// A submission waiting for remote confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineTripRecord {
    /// Same identity as the corresponding `TripEntry`.
    pub id: TripId,
    pub payload: TripReportInput,
    pub attachments: Vec<QueuedPhoto>,
    pub created_at: DateTime<Utc>,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// SQLite-backed offline queue. Cheap to clone; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    /// Open (or create) the queue database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create queue directory at {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to open offline queue at {:?}", path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trip_queue (
                id               TEXT PRIMARY KEY,
                payload          TEXT NOT NULL,
                attachments      TEXT NOT NULL,
                status           TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                last_attempt_at  TEXT NULL,
                error            TEXT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create trip_queue table")?;

        Ok(Self { pool })
    }

    /// Open the queue at the default per-user data path.
    pub async fn open_default() -> anyhow::Result<Self> {
        Self::open(queue_db_path()?).await
    }

    /// Read the full persisted queue in insertion (FIFO) order.
    pub async fn load(&self) -> anyhow::Result<Vec<OfflineTripRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, attachments, status, created_at, last_attempt_at, error
            FROM trip_queue
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load offline queue")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Insert or replace a record by id, then return the full persisted
    /// queue as the caller's new source of truth.
    pub async fn upsert(&self, record: &OfflineTripRecord) -> anyhow::Result<Vec<OfflineTripRecord>> {
        sqlx::query(
            r#"
            INSERT INTO trip_queue (id, payload, attachments, status, created_at, last_attempt_at, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                attachments = excluded.attachments,
                status = excluded.status,
                last_attempt_at = excluded.last_attempt_at,
                error = excluded.error
            "#,
        )
        .bind(record.id.to_string())
        .bind(serde_json::to_string(&record.payload).context("failed to serialize queue payload")?)
        .bind(
            serde_json::to_string(&record.attachments)
                .context("failed to serialize queue attachments")?,
        )
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.last_attempt_at.map(|dt| dt.to_rfc3339()))
        .bind(record.error.as_deref())
        .execute(&self.pool)
        .await
        .context("failed to upsert queued record")?;

        self.load().await
    }

    /// Delete a record (implicit effect of a successful remote write), then
    /// return the remaining persisted queue.
    pub async fn remove(&self, id: TripId) -> anyhow::Result<Vec<OfflineTripRecord>> {
        sqlx::query("DELETE FROM trip_queue WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to remove queued record")?;

        self.load().await
    }

    /// Mark a record failed with the captured error text, stamping the
    /// attempt time. The record stays queued and retryable.
    pub async fn mark_failed(&self, id: TripId, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE trip_queue
            SET status = 'failed',
                error = ?2,
                last_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to mark queued record as failed")?;

        Ok(())
    }

    /// Number of persisted records.
    pub async fn len(&self) -> anyhow::Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trip_queue")
            .fetch_one(&self.pool)
            .await
            .context("failed to count queued records")?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Map a database row into an `OfflineTripRecord`.
fn row_to_record(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<OfflineTripRecord> {
    let id_str: String = row.try_get("id")?;
    let id = id_str
        .parse::<TripId>()
        .map_err(|e| anyhow::anyhow!("invalid id in trip_queue: {}", e))?;

    let payload_str: String = row.try_get("payload")?;
    let payload: TripReportInput =
        serde_json::from_str(&payload_str).context("invalid JSON payload in trip_queue")?;

    let attachments_str: String = row.try_get("attachments")?;
    let attachments: Vec<QueuedPhoto> =
        serde_json::from_str(&attachments_str).context("invalid attachments in trip_queue")?;

    let status_str: String = row.try_get("status")?;
    let status = QueueStatus::parse(&status_str)?;

    let created_at_str: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .context("invalid created_at in trip_queue")?;

    let last_attempt_at = row
        .try_get::<Option<String>, _>("last_attempt_at")?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .context("invalid last_attempt_at in trip_queue")
        })
        .transpose()?;

    let error: Option<String> = row.try_get("error")?;

    Ok(OfflineTripRecord {
        id,
        payload,
        attachments,
        created_at,
        status,
        error,
        last_attempt_at,
    })
}

/// Resolve the default path of the queue database:
/// `{app_data_dir}/tripdesk/queue.db`.
fn queue_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory")?;

    let mut dir = base;
    dir.push("tripdesk");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory at {:?}", dir))?;
    dir.push("queue.db");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tripdesk_trips::{SyncSource, TripChecklist, TripEntry, TripFormSnapshot};

    fn sample_record(seq: u32, created_at: DateTime<Utc>) -> OfflineTripRecord {
        let form = TripFormSnapshot {
            booking_source: "airport-app".into(),
            supplier: "fleet".into(),
            client_name: "client".into(),
            driver_name: "driver".into(),
            car_type: "sedan".into(),
            parking_location: "p".into(),
            pickup_point: "a".into(),
            dropoff_point: "b".into(),
            supervisor_rating: 4,
            ..Default::default()
        };
        let entry = TripEntry::compose(
            TripId::new(),
            format!("TRP-26-08-{:04}", seq),
            NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            form,
            TripChecklist::all_good(),
            vec![],
            None,
            created_at,
        );
        OfflineTripRecord {
            id: entry.id,
            payload: entry.to_report_input(SyncSource::OfflineCache),
            attachments: vec![QueuedPhoto {
                id: "ph1".into(),
                name: "front.jpg".into(),
                mime_type: "image/jpeg".into(),
                size: 3,
                base64: "YWJj".into(),
            }],
            created_at,
            status: QueueStatus::Pending,
            error: None,
            last_attempt_at: None,
        }
    }

    async fn temp_queue() -> (tempfile::TempDir, OfflineQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::open(dir.path().join("queue.db")).await.unwrap();
        (dir, queue)
    }

    #[tokio::test]
    async fn enqueue_persists_and_returns_full_queue() {
        let (_dir, queue) = temp_queue().await;
        let record = sample_record(1, Utc::now());

        let snapshot = queue.upsert(&record).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0], record);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let (_dir, queue) = temp_queue().await;
        let mut record = sample_record(1, Utc::now());
        queue.upsert(&record).await.unwrap();

        record.status = QueueStatus::Failed;
        record.error = Some("timeout".into());
        let snapshot = queue.upsert(&record).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, QueueStatus::Failed);
        assert_eq!(snapshot[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn load_returns_fifo_order() {
        let (_dir, queue) = temp_queue().await;
        let base = Utc::now();
        let first = sample_record(1, base - Duration::seconds(2));
        let second = sample_record(2, base - Duration::seconds(1));
        let third = sample_record(3, base);
        // insert out of order; created_at decides
        queue.upsert(&third).await.unwrap();
        queue.upsert(&first).await.unwrap();
        queue.upsert(&second).await.unwrap();

        let loaded = queue.load().await.unwrap();
        let bookings: Vec<&str> = loaded
            .iter()
            .map(|r| r.payload.booking_id.as_str())
            .collect();
        assert_eq!(
            bookings,
            ["TRP-26-08-0001", "TRP-26-08-0002", "TRP-26-08-0003"]
        );
    }

    #[tokio::test]
    async fn remove_deletes_exactly_one_record() {
        let (_dir, queue) = temp_queue().await;
        let keep = sample_record(1, Utc::now());
        let gone = sample_record(2, Utc::now());
        queue.upsert(&keep).await.unwrap();
        queue.upsert(&gone).await.unwrap();

        let snapshot = queue.remove(gone.id).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, keep.id);
    }

    #[tokio::test]
    async fn mark_failed_keeps_record_with_error_and_attempt_time() {
        let (_dir, queue) = temp_queue().await;
        let record = sample_record(1, Utc::now());
        queue.upsert(&record).await.unwrap();

        queue.mark_failed(record.id, "server error 500").await.unwrap();
        let loaded = queue.load().await.unwrap();
        assert_eq!(loaded[0].status, QueueStatus::Failed);
        assert_eq!(loaded[0].error.as_deref(), Some("server error 500"));
        assert!(loaded[0].last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let record = sample_record(1, Utc::now());
        {
            let queue = OfflineQueue::open(&path).await.unwrap();
            queue.upsert(&record).await.unwrap();
        }
        let queue = OfflineQueue::open(&path).await.unwrap();
        let loaded = queue.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], record);
    }
}
