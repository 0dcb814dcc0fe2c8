//! Staged, all-or-nothing writes for one reconciliation cycle.
//!
//! Reads go straight to the store while the cycle runs; every mutation is
//! staged here and applied in a single SQLite transaction by [`UnitOfWork::commit`].
//! Dropping an uncommitted unit of work discards everything it staged.

use std::collections::HashSet;

use super::{artifact_repo, job_repo, ArtifactRow, Database, DatabaseError, JobRow};

/// Counts of what a commit actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub jobs_updated: usize,
    /// Updates dropped because the stored job had meanwhile become terminal.
    pub jobs_skipped: usize,
    pub artifacts_added: usize,
    pub jobs_deleted: usize,
}

pub struct UnitOfWork {
    db: Database,
    job_updates: Vec<JobRow>,
    new_artifacts: Vec<ArtifactRow>,
    deleted_jobs: Vec<String>,
}

impl UnitOfWork {
    pub fn begin(db: &Database) -> Self {
        Self {
            db: db.clone(),
            job_updates: Vec::new(),
            new_artifacts: Vec::new(),
            deleted_jobs: Vec::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Stages the new state of a job, replacing any earlier staged state.
    pub fn stage_job_update(&mut self, job: JobRow) {
        match self.job_updates.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => self.job_updates.push(job),
        }
    }

    /// Stages a new artifact. Returns `false` if one with the same path is
    /// already staged for the job.
    pub fn stage_artifact(&mut self, artifact: ArtifactRow) -> bool {
        let duplicate = self
            .new_artifacts
            .iter()
            .any(|a| a.job_id == artifact.job_id && a.file_path == artifact.file_path);
        if duplicate {
            return false;
        }
        self.new_artifacts.push(artifact);
        true
    }

    /// Stages deletion of a job together with all of its artifacts.
    pub fn stage_job_deletion(&mut self, job_id: &str) {
        if !self.deleted_jobs.iter().any(|id| id == job_id) {
            self.deleted_jobs.push(job_id.to_string());
        }
    }

    /// Paths indexed for a job, stored or staged.
    pub fn artifact_paths(&self, job_id: &str) -> Result<HashSet<String>, DatabaseError> {
        let mut paths = artifact_repo::paths_for_job(&self.db, job_id)?;
        paths.extend(
            self.new_artifacts
                .iter()
                .filter(|a| a.job_id == job_id)
                .map(|a| a.file_path.clone()),
        );
        Ok(paths)
    }

    pub fn is_empty(&self) -> bool {
        self.job_updates.is_empty() && self.new_artifacts.is_empty() && self.deleted_jobs.is_empty()
    }

    /// Applies every staged change in one transaction: job updates, then
    /// artifact inserts, then deletions (artifacts before their job).
    /// Artifacts of a job whose update was skipped are dropped with it.
    pub fn commit(self) -> Result<CommitSummary, DatabaseError> {
        if self.is_empty() {
            return Ok(CommitSummary::default());
        }

        let Self {
            db,
            job_updates,
            new_artifacts,
            deleted_jobs,
        } = self;

        db.transaction(|tx| {
            let mut summary = CommitSummary::default();
            let mut skipped = HashSet::new();

            for job in &job_updates {
                if job_repo::update_in(tx, job, true)? {
                    summary.jobs_updated += 1;
                } else {
                    log::warn!(
                        "Skipped update for job {}: no longer pending remote completion",
                        job.id
                    );
                    summary.jobs_skipped += 1;
                    skipped.insert(job.id.as_str());
                }
            }

            for artifact in new_artifacts
                .iter()
                .filter(|a| !skipped.contains(a.job_id.as_str()))
            {
                if artifact_repo::insert_in(tx, artifact)? {
                    summary.artifacts_added += 1;
                }
            }

            for job_id in &deleted_jobs {
                if job_repo::delete_in(tx, job_id)? {
                    summary.jobs_deleted += 1;
                }
            }

            Ok(summary)
        })
    }
}
