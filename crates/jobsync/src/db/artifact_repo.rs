//! Output files indexed for a job.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::ArtifactKind;

/// One classified output file of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRow {
    pub id: String,
    pub job_id: String,
    pub file_name: String,
    /// Absolute path; unique per job.
    pub file_path: String,
    pub kind: ArtifactKind,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn new(
        job_id: &str,
        file_path: &str,
        kind: ArtifactKind,
        mime_type: &str,
        size_bytes: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let file_name = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            file_name,
            file_path: file_path.to_string(),
            kind,
            mime_type: Some(mime_type.to_string()),
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
            created_at,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let kind: String = row.get("kind")?;
        let kind = kind.parse::<ArtifactKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?;
        let created_at: String = row.get("created_at")?;

        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            kind,
            mime_type: row.get("mime_type")?,
            size_bytes: row.get("size_bytes")?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }
}

/// Inserts an artifact row.
pub fn insert(db: &Database, artifact: &ArtifactRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        insert_in(conn, artifact)?;
        Ok(())
    })
}

/// Inserts unless the job already has an artifact at the same path.
/// Returns whether a row was written.
pub(crate) fn insert_in(conn: &Connection, artifact: &ArtifactRow) -> Result<bool, DatabaseError> {
    let written = conn.execute(
        "INSERT OR IGNORE INTO artifacts (id, job_id, file_name, file_path, kind, mime_type,
         size_bytes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            artifact.id,
            artifact.job_id,
            artifact.file_name,
            artifact.file_path,
            artifact.kind.as_str(),
            artifact.mime_type,
            artifact.size_bytes,
            format_timestamp(&artifact.created_at),
        ],
    )?;
    Ok(written > 0)
}

/// Lists a job's artifacts ordered by path.
pub fn list_by_job(db: &Database, job_id: &str) -> Result<Vec<ArtifactRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM artifacts WHERE job_id = ?1 ORDER BY file_path ASC")?;
        let rows = stmt
            .query_map(params![job_id], ArtifactRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the set of file paths already indexed for a job.
pub fn paths_for_job(db: &Database, job_id: &str) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT file_path FROM artifacts WHERE job_id = ?1")?;
        let paths = stmt
            .query_map(params![job_id], |r| r.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(paths)
    })
}

/// Counts artifacts across all jobs.
pub fn count_all(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;
        Ok(count)
    })
}
