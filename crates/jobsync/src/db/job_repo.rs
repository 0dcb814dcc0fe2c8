//! Reads and writes of the `jobs` table.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::JobStatus;

/// A job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub pipeline: String,
    pub status: JobStatus,
    pub endpoint_id: Option<String>,
    pub external_job_id: Option<String>,
    /// Pipeline parameters as JSON text.
    pub parameters: Option<String>,
    pub input_archive_path: Option<String>,
    pub result_dir: Option<String>,
    pub result_archive: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fixed at creation; never recomputed.
    pub expires_at: DateTime<Utc>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status = status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let expires_at: String = row.get("expires_at")?;

        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            pipeline: row.get("pipeline")?,
            status,
            endpoint_id: row.get("endpoint_id")?,
            external_job_id: row.get("external_job_id")?,
            parameters: row.get("parameters")?,
            input_archive_path: row.get("input_archive_path")?,
            result_dir: row.get("result_dir")?,
            result_archive: row.get("result_archive")?,
            error_message: row.get("error_message")?,
            created_at: parse_timestamp("created_at", &created_at)?,
            updated_at: parse_timestamp("updated_at", &updated_at)?,
            expires_at: parse_timestamp("expires_at", &expires_at)?,
        })
    }

    /// Whether the job has been dispatched and can be polled remotely.
    pub fn remote_ids(&self) -> Option<(&str, &str)> {
        match (self.endpoint_id.as_deref(), self.external_job_id.as_deref()) {
            (Some(endpoint), Some(external)) if !endpoint.is_empty() && !external.is_empty() => {
                Some((endpoint, external))
            }
            _ => None,
        }
    }
}

/// Input for creating a job record. Creation itself belongs to the
/// request-handling layer; this only fixes the derived fields.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub user_id: i64,
    pub title: String,
    pub pipeline: String,
    pub parameters: Option<String>,
    pub endpoint_id: Option<String>,
    pub external_job_id: Option<String>,
    pub input_archive_path: Option<String>,
}

impl NewJob {
    /// Builds a pending job row expiring `retention` after `now`.
    pub fn into_row(self, now: DateTime<Utc>, retention: Duration) -> JobRow {
        JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            title: self.title,
            pipeline: self.pipeline,
            status: JobStatus::Pending,
            endpoint_id: self.endpoint_id,
            external_job_id: self.external_job_id,
            parameters: self.parameters,
            input_archive_path: self.input_archive_path,
            result_dir: None,
            result_archive: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + retention,
        }
    }
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, user_id, title, pipeline, status, endpoint_id, external_job_id,
             parameters, input_archive_path, result_dir, result_archive, error_message,
             created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id,
                job.user_id,
                job.title,
                job.pipeline,
                job.status.as_str(),
                job.endpoint_id,
                job.external_job_id,
                job.parameters,
                job.input_archive_path,
                job.result_dir,
                job.result_archive,
                job.error_message,
                format_timestamp(&job.created_at),
                format_timestamp(&job.updated_at),
                format_timestamp(&job.expires_at),
            ],
        )?;
        Ok(())
    })
}

/// Updates an existing job row. `id`, `created_at` and `expires_at` are
/// never written.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        update_in(conn, job, false)?;
        Ok(())
    })
}

/// Writes the mutable columns of `job`.
///
/// With `only_if_polled` the row is only touched while its stored status is
/// still non-terminal, so a concurrent terminal write is never overwritten.
/// Returns whether a row was updated.
pub(crate) fn update_in(
    conn: &Connection,
    job: &JobRow,
    only_if_polled: bool,
) -> Result<bool, DatabaseError> {
    let guard = if only_if_polled {
        format!(" AND status IN ({})", status_list(&JobStatus::NON_TERMINAL))
    } else {
        String::new()
    };
    let sql = format!(
        "UPDATE jobs SET user_id=?2, title=?3, pipeline=?4, status=?5, endpoint_id=?6,
         external_job_id=?7, parameters=?8, input_archive_path=?9, result_dir=?10,
         result_archive=?11, error_message=?12, updated_at=?13
         WHERE id=?1{}",
        guard
    );
    let changed = conn.execute(
        &sql,
        params![
            job.id,
            job.user_id,
            job.title,
            job.pipeline,
            job.status.as_str(),
            job.endpoint_id,
            job.external_job_id,
            job.parameters,
            job.input_archive_path,
            job.result_dir,
            job.result_archive,
            job.error_message,
            format_timestamp(&job.updated_at),
        ],
    )?;
    Ok(changed > 0)
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
            .optional()?;
        Ok(job)
    })
}

/// Lists jobs whose status is one of `statuses`, oldest first.
pub fn list_by_statuses(
    db: &Database,
    statuses: &[JobStatus],
) -> Result<Vec<JobRow>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    db.with_conn(|conn| {
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM jobs WHERE status IN ({}) ORDER BY created_at ASC",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(statuses.iter().map(|s| s.as_str())), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists every job the reconciliation loop still polls.
pub fn list_non_terminal(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    list_by_statuses(db, &JobStatus::NON_TERMINAL)
}

/// Lists jobs whose `expires_at` is strictly before `now`.
pub fn list_expired(db: &Database, now: DateTime<Utc>) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE expires_at < ?1 ORDER BY expires_at ASC")?;
        let rows = stmt
            .query_map(params![format_timestamp(&now)], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a job and its artifacts atomically. Returns whether the job
/// existed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.transaction(|tx| delete_in(tx, id))
}

/// Deletes artifacts first, then the job, on an open connection or
/// transaction.
pub(crate) fn delete_in(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    conn.execute("DELETE FROM artifacts WHERE job_id = ?1", params![id])?;
    let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn status_list(statuses: &[JobStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
