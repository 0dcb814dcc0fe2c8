//! SQLite job store.
//!
//! One connection behind a mutex, shared by the reconciliation worker and
//! the dispatch path. The lock is held for a single call and never across
//! remote I/O.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};

pub mod artifact_repo;
pub mod error;
pub mod job_repo;
pub mod migrations;
pub mod unit_of_work;

pub use artifact_repo::ArtifactRow;
pub use error::DatabaseError;
pub use job_repo::{JobRow, NewJob};
pub use unit_of_work::{CommitSummary, UnitOfWork};

/// Shared handle to the job store. Clones refer to the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the store file, creating parent directories as needed, and
    /// upgrades its schema. File stores use write-ahead logging.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let db = Self::prepare(Connection::open(path)?, "PRAGMA journal_mode=WAL;")?;
        log::info!("Job store ready at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, "")
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, DatabaseError> {
        conn.execute_batch(pragmas)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        f(&*self.lock()?)
    }

    /// Runs `f` in one transaction, committed only when `f` returns `Ok`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Formats a timestamp the way every time column is stored.
///
/// Fixed-width RFC 3339 in UTC, so string comparison in SQL matches
/// chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid timestamp in '{}': {}", column, e).into(),
            )
        })
}
