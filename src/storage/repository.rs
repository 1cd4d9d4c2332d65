//! Repository Pattern for Schedule Persistence
//!
//! The diff engine and the consumer-facing reads only see the
//! [`ScheduleRepository`] trait. Two implementations ship:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              UpsertEngine / RegionRegistry                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ScheduleRepository                        │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//!        ┌─────────────────┐         ┌─────────────────┐
//!        │     SQLite      │         │      Mock       │
//!        │  (production)   │         │   (in-memory)   │
//!        └─────────────────┘         └─────────────────┘
//! ```
//!
//! A batch write is all-or-nothing: readers see either every record of a
//! batch in its old state or every record in its new state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{DaySlots, ScheduleKey, ScheduleRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

// ============================================================================
// Core Types
// ============================================================================

/// One record to write
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleWrite {
    pub key: ScheduleKey,
    pub slots: DaySlots,
    pub as_of_time: Option<NaiveTime>,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Persistence boundary for schedule records
pub trait ScheduleRepository: Send + Sync {
    /// Record for `key`, if any
    fn get(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>>;

    /// Write all records in one transaction, replacing existing keys
    fn upsert_batch(&self, writes: &[ScheduleWrite]) -> Result<()>;

    /// Every record of `region` for `date`, in group order
    fn list_for_date(&self, region: &str, date: NaiveDate) -> Result<Vec<ScheduleRecord>>;

    /// Total number of records
    fn count(&self) -> Result<usize>;

    /// Write a single record
    fn upsert(
        &self,
        key: &ScheduleKey,
        slots: DaySlots,
        as_of_time: Option<NaiveTime>,
    ) -> Result<()> {
        self.upsert_batch(&[ScheduleWrite {
            key: key.clone(),
            slots,
            as_of_time,
        }])
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of ScheduleRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteScheduleRepository {
    conn: Mutex<Connection>,
}

impl SqliteScheduleRepository {
    /// Open (and create if needed) a repository at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while an update batch is being written
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::other("SQLite connection lock poisoned"))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS schedules (
                    date TEXT NOT NULL,
                    region TEXT NOT NULL,
                    group_code TEXT NOT NULL,
                    hours_data TEXT NOT NULL,
                    site_updated_at TEXT,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (date, region, group_code)
                );

                CREATE INDEX IF NOT EXISTS idx_schedules_region_date
                    ON schedules(region, date);
                "#,
        )?;

        Ok(())
    }
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    let date: String = row.get(0)?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_error(0, e))?;

    let hours_data: String = row.get(3)?;
    let slots = DaySlots::from_json(&hours_data).map_err(|e| conversion_error(3, e))?;

    let as_of_time = row
        .get::<_, Option<String>>(4)?
        .map(|t| NaiveTime::parse_from_str(&t, TIME_FORMAT))
        .transpose()
        .map_err(|e| conversion_error(4, e))?;

    let updated_at: String = row.get(5)?;
    let fetched_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(5, e))?;

    Ok(ScheduleRecord {
        key: ScheduleKey::new(date, row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        slots,
        as_of_time,
        fetched_at,
    })
}

impl ScheduleRepository for SqliteScheduleRepository {
    fn get(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT date, region, group_code, hours_data, site_updated_at, updated_at
                 FROM schedules WHERE date = ?1 AND region = ?2 AND group_code = ?3",
                params![key.date.format(DATE_FORMAT).to_string(), key.region, key.group],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    fn upsert_batch(&self, writes: &[ScheduleWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                r#"
                    INSERT INTO schedules (date, region, group_code, hours_data, site_updated_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(date, region, group_code) DO UPDATE SET
                        hours_data = excluded.hours_data,
                        site_updated_at = excluded.site_updated_at,
                        updated_at = excluded.updated_at
                    "#,
            )?;

            for write in writes {
                stmt.execute(params![
                    write.key.date.format(DATE_FORMAT).to_string(),
                    write.key.region,
                    write.key.group,
                    write.slots.to_json()?,
                    write
                        .as_of_time
                        .map(|t| t.format(TIME_FORMAT).to_string()),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(records = writes.len(), "Schedule batch committed");
        Ok(())
    }

    fn list_for_date(&self, region: &str, date: NaiveDate) -> Result<Vec<ScheduleRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, region, group_code, hours_data, site_updated_at, updated_at
             FROM schedules WHERE region = ?1 AND date = ?2 ORDER BY group_code",
        )?;

        let records = stmt
            .query_map(
                params![region, date.format(DATE_FORMAT).to_string()],
                row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

// ============================================================================
// Mock Implementation
// ============================================================================

/// In-memory mock implementation of ScheduleRepository
#[derive(Default)]
pub struct MockScheduleRepository {
    records: RwLock<BTreeMap<ScheduleKey, ScheduleRecord>>,
}

impl MockScheduleRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if the repository is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::other("in-memory repository lock poisoned")
}

impl ScheduleRepository for MockScheduleRepository {
    fn get(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).cloned())
    }

    fn upsert_batch(&self, writes: &[ScheduleWrite]) -> Result<()> {
        let now = Utc::now();
        let mut records = self.records.write().map_err(poisoned)?;

        for write in writes {
            records.insert(
                write.key.clone(),
                ScheduleRecord {
                    key: write.key.clone(),
                    slots: write.slots,
                    as_of_time: write.as_of_time,
                    fetched_at: now,
                },
            );
        }

        Ok(())
    }

    fn list_for_date(&self, region: &str, date: NaiveDate) -> Result<Vec<ScheduleRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .filter(|r| r.key.region == region && r.key.date == date)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedScheduleRepository = Arc<dyn ScheduleRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> Result<SharedScheduleRepository> {
    let repo = SqliteScheduleRepository::new(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedScheduleRepository {
    Arc::new(MockScheduleRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
