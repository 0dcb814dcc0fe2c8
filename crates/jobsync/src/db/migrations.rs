//! Schema versioning for the job store.
//!
//! Every schema change is a numbered SQL script recorded in
//! `schema_version` once applied. Scripts run in ascending order, each
//! inside its own transaction together with its bookkeeping row.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::DatabaseError;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "jobs",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    SchemaStep {
        version: 2,
        name: "artifacts",
        sql: include_str!("sql/002_create_artifacts.sql"),
    },
];

/// Brings the schema on `conn` up to the newest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );",
    )?;

    let applied = applied_version(conn)?;
    let pending: Vec<&SchemaStep> = STEPS.iter().filter(|s| s.version > applied).collect();
    if pending.is_empty() {
        log::debug!("Schema is current at version {}", applied);
        return Ok(());
    }

    for step in pending {
        apply(conn, step).map_err(|e| DatabaseError::Migration {
            version: step.version,
            reason: e.to_string(),
        })?;
        log::info!("Applied schema version {} ({})", step.version, step.name);
    }
    Ok(())
}

fn applied_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |r| {
            r.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn apply(conn: &Connection, step: &SchemaStep) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(step.sql)?;
    tx.execute(
        "INSERT INTO schema_version (version, name) VALUES (?1, ?2)",
        params![step.version, step.name],
    )?;
    tx.commit()?;
    Ok(())
}
