//! Turns a finished job's output payload into files under its result
//! directory and indexes them as artifacts.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tracing::info_span;
use walkdir::WalkDir;

use crate::db::{ArtifactRow, JobRow, UnitOfWork};
use crate::error::IngestError;
use crate::model::{classify, ArtifactKind};
use crate::remote::JobOutput;
use crate::sanitize::redact_path;
use crate::storage::archive::decode_base64;
use crate::storage::layout::{file_component, write_file};
use crate::storage::{extract_archive, ArchiveFormat, StorageLayout};

/// What one ingestion run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub archives_written: usize,
    pub entries_skipped: usize,
    pub artifacts_staged: usize,
}

pub struct ResultIngestor {
    layout: StorageLayout,
}

impl ResultIngestor {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Writes and extracts every archive in `output`, then stages an artifact
    /// for each file under the result directory not indexed yet.
    ///
    /// Updates `result_dir` and `result_archive` on `job`; the caller stages
    /// the job itself. Undecodable entries are skipped, filesystem errors
    /// are returned.
    pub fn ingest(
        &self,
        uow: &mut UnitOfWork,
        job: &mut JobRow,
        output: &JobOutput,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, IngestError> {
        let _span = info_span!("ingest", job_id = %job.id).entered();
        let mut report = IngestReport::default();
        let mut known = uow.artifact_paths(&job.id)?;
        let mut result_dir = None;

        for (name, encoded) in archive_entries(&job.id, output) {
            let raw = match decode_entry(&name, encoded) {
                Ok(raw) => raw,
                Err(e) if e.is_entry_local() => {
                    warn!("Job {}: skipping output entry: {}", job.id, e);
                    report.entries_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let dir = self.layout.results_dir(job.user_id, &job.id)?;
            let archive_path = dir.join(file_component(&name));
            write_file(&archive_path, &raw)?;
            report.archives_written += 1;

            let archive_path_str = archive_path.to_string_lossy().into_owned();
            job.result_archive = Some(archive_path_str.clone());

            if known.insert(archive_path_str.clone()) {
                let format = ArchiveFormat::detect(&raw);
                uow.stage_artifact(ArtifactRow::new(
                    &job.id,
                    &archive_path_str,
                    ArtifactKind::Archive,
                    format.mime_type(),
                    raw.len() as u64,
                    now,
                ));
                report.artifacts_staged += 1;
            }

            match extract_archive(&raw, &dir) {
                Ok(count) => debug!(
                    "Extracted {} entries from {}",
                    count,
                    redact_path(&archive_path)
                ),
                Err(e) => debug!(
                    "Not extracting {}: {}",
                    redact_path(&archive_path),
                    e
                ),
            }

            result_dir = Some(dir);
        }

        if let Some(dir) = result_dir {
            report.artifacts_staged += index_directory(uow, &job.id, &dir, &mut known, now)?;
            job.result_dir = Some(dir.to_string_lossy().into_owned());
        }

        info!(
            "Ingested output of job {}: {} archive(s), {} new artifact(s), {} skipped",
            job.id, report.archives_written, report.artifacts_staged, report.entries_skipped
        );
        Ok(report)
    }
}

/// Archive entries of a payload as `(name, base64)`. The `archives` list wins
/// over the single `archive_base64` form; entries without content are dropped.
fn archive_entries<'a>(job_id: &str, output: &'a JobOutput) -> Vec<(String, &'a str)> {
    let default_name = || format!("{}.tar.gz", job_id);

    if !output.archives.is_empty() {
        return output
            .archives
            .iter()
            .filter_map(|entry| {
                let encoded = entry.base64.as_deref().filter(|b| !b.is_empty())?;
                let name = entry
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(default_name);
                Some((name, encoded))
            })
            .collect();
    }

    output
        .archive_base64
        .as_deref()
        .filter(|b| !b.is_empty())
        .map(|encoded| vec![(default_name(), encoded)])
        .unwrap_or_default()
}

fn decode_entry(name: &str, encoded: &str) -> Result<Vec<u8>, IngestError> {
    let raw = decode_base64(encoded).map_err(|e| IngestError::Decode {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    if raw.is_empty() {
        return Err(IngestError::EmptyArchive {
            name: name.to_string(),
        });
    }
    Ok(raw)
}

/// Stages an artifact for every regular file under `dir` whose path is not
/// in `known`. Returns how many were staged.
fn index_directory(
    uow: &mut UnitOfWork,
    job_id: &str,
    dir: &Path,
    known: &mut HashSet<String>,
    now: DateTime<Utc>,
) -> Result<usize, IngestError> {
    let mut staged = 0;

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::Index {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let path_str = path.to_string_lossy().into_owned();
        if known.contains(&path_str) {
            continue;
        }

        let size = entry
            .metadata()
            .map_err(|e| IngestError::Index {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        let (kind, mime_type) = classify(path);
        if uow.stage_artifact(ArtifactRow::new(job_id, &path_str, kind, mime_type, size, now)) {
            staged += 1;
        }
        known.insert(path_str);
    }

    Ok(staged)
}
