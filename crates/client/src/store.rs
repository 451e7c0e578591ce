//! Date-scoped local aggregate store.
//!
//! Confirmed entries live in a per-day section document, separate from the
//! offline queue (which is keyed by record id, not by date). The store is a
//! generic `(day, section) -> JSON` table with typed helpers for the trips
//! section; other dashboard sections use the same generic surface and are
//! not this crate's concern.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};

use tripdesk_trips::TripEntry;

/// Trips section of one day's aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripsSection {
    pub trip_count: usize,
    pub entries: Vec<TripEntry>,
    pub pending_sync_count: usize,
}

impl TripsSection {
    /// Insert or replace an entry by id, keeping `trip_count` consistent.
    pub fn upsert_entry(&mut self, entry: TripEntry) {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
        self.trip_count = self.entries.len();
    }
}

/// Durable store for confirmed entries, keyed by calendar day.
#[async_trait]
pub trait DayStore: Send + Sync {
    /// Read the trips section for a day (default if never written).
    async fn read_trips(&self, date: NaiveDate) -> anyhow::Result<TripsSection>;

    /// Persist the trips section for a day.
    async fn write_trips(&self, date: NaiveDate, section: &TripsSection) -> anyhow::Result<()>;
}

/// SQLite-backed day store.
#[derive(Debug, Clone)]
pub struct SqliteDayStore {
    pool: SqlitePool,
}

impl SqliteDayStore {
    /// Open (or create) the store database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory at {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to open day store at {:?}", path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS day_sections (
                day        TEXT NOT NULL,
                section    TEXT NOT NULL,
                data       TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (day, section)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create day_sections table")?;

        Ok(Self { pool })
    }

    /// Open the store at the default per-user data path.
    pub async fn open_default() -> anyhow::Result<Self> {
        Self::open(store_db_path()?).await
    }

    /// Read one section of a day's aggregate; `None` if never written.
    pub async fn read_section<T: DeserializeOwned>(
        &self,
        date: NaiveDate,
        section: &str,
    ) -> anyhow::Result<Option<T>> {
        let row = sqlx::query(
            "SELECT data FROM day_sections WHERE day = ?1 AND section = ?2",
        )
        .bind(date.to_string())
        .bind(section)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read day section")?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                let value = serde_json::from_str(&data)
                    .with_context(|| format!("invalid JSON in day section '{}'", section))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write one section of a day's aggregate.
    pub async fn write_section<T: Serialize>(
        &self,
        date: NaiveDate,
        section: &str,
        value: &T,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO day_sections (day, section, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(day, section) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(date.to_string())
        .bind(section)
        .bind(serde_json::to_string(value).context("failed to serialize day section")?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to write day section")?;

        Ok(())
    }
}

#[async_trait]
impl DayStore for SqliteDayStore {
    async fn read_trips(&self, date: NaiveDate) -> anyhow::Result<TripsSection> {
        Ok(self
            .read_section(date, "trips")
            .await?
            .unwrap_or_default())
    }

    async fn write_trips(&self, date: NaiveDate, section: &TripsSection) -> anyhow::Result<()> {
        self.write_section(date, "trips", section).await
    }
}

/// Resolve the default path of the store database:
/// `{app_data_dir}/tripdesk/days.db`.
fn store_db_path() -> anyhow::Result<PathBuf> {
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
    dir.push("days.db");
    Ok(dir)
}
