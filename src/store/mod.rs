//! Durable, append-only history of probe results backed by SQLite.

pub mod error;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use tokio::sync::Mutex;

pub use error::{StoreError, StoreResult};

use crate::http_probe::prelude::*;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS api_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    response_time REAL,
    status_code INTEGER NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_api_metrics_timestamp ON api_metrics(timestamp DESC);
";

/// Handle to the metrics database. Clones share one connection.
///
/// Every operation takes the connection lock on the blocking pool, so id
/// assignment and the row write happen as one unit and readers never see
/// a half-written row.
#[derive(Clone)]
pub struct MetricsStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore").finish()
    }
}

impl MetricsStore {
    /// Opens or creates the database at `path` and ensures the schema exists.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Open(format!("failed to set WAL mode: {e}")))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| StoreError::Open(format!("failed to set synchronous mode: {e}")))?;

        let store = Self::from_connection(conn)?;
        tracing::info!("Metrics database opened at {:?}", path);
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Open(format!("failed to initialise schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persists a completed probe and returns the stored row.
    ///
    /// The result is stamped with the current time if the caller did not
    /// stamp it. Once this returns `Ok`, the row is visible to `recent` and
    /// survives a restart.
    pub async fn append(&self, probe: NewProbeResult) -> StoreResult<ProbeResult> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            // Stored at microsecond precision; return what a reader will see.
            let timestamp = probe.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);

            conn.execute(
                "INSERT INTO api_metrics (timestamp, endpoint, response_time, status_code, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_timestamp(&timestamp),
                    probe.endpoint,
                    probe.outcome.response_time_ms(),
                    probe.outcome.status_code(),
                    probe.outcome.error_message(),
                ],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
            let id = conn.last_insert_rowid();

            tracing::debug!(id, endpoint = %probe.endpoint, "Stored probe result");
            Ok::<_, StoreError>(ProbeResult::from_new(id, timestamp, probe))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Returns up to `limit` rows, most recently initiated first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<ProbeResult>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(
                    "SELECT id, timestamp, endpoint, response_time, status_code, error_message
                     FROM api_metrics
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(|e| StoreError::Read(e.to_string()))?;

            let rows = stmt
                .query_map(params![limit], row_to_probe_result)
                .map_err(|e| StoreError::Read(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| match e {
                    rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..) => {
                        StoreError::Corrupt(e.to_string())
                    }
                    other => StoreError::Read(other.to_string()),
                })?;

            Ok::<_, StoreError>(rows)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
impl MetricsStore {
    /// Runs arbitrary SQL against the underlying connection.
    pub(crate) async fn execute_raw(&self, sql: &str) {
        self.conn.lock().await.execute_batch(sql).expect("raw sql");
    }
}

/// Fixed-width UTC timestamps sort lexically in chronological order.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_probe_result(row: &Row<'_>) -> rusqlite::Result<ProbeResult> {
    let raw_timestamp: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_timestamp)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(ProbeResult {
        id: row.get(0)?,
        timestamp,
        endpoint: row.get(2)?,
        response_time_ms: row.get(3)?,
        status_code: row.get(4)?,
        error_message: row.get(5)?,
    })
}
