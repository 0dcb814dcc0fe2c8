//! Purges jobs past their expiry together with their on-disk trees.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::db::{job_repo, DatabaseError, JobRow, UnitOfWork};
use crate::error::StorageError;
use crate::sanitize::redact_path;
use crate::storage::{remove_tree, StorageLayout};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs staged for deletion.
    pub purged: usize,
    /// Jobs kept because their files could not be removed.
    pub failed: usize,
}

pub struct RetentionSweeper {
    layout: StorageLayout,
}

impl RetentionSweeper {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Removes the result and upload trees of every job with
    /// `expires_at < now` and stages its deletion. A job whose files cannot
    /// be removed stays in the store and is retried on the next sweep.
    pub fn sweep(
        &self,
        uow: &mut UnitOfWork,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, DatabaseError> {
        let expired = job_repo::list_expired(uow.db(), now)?;
        let mut report = SweepReport::default();

        for job in &expired {
            match self.remove_files(job) {
                Ok(removed) => {
                    debug!("Removed {} path(s) of expired job {}", removed, job.id);
                    uow.stage_job_deletion(&job.id);
                    report.purged += 1;
                }
                Err(e) => {
                    warn!("Keeping expired job {} for now: {}", job.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.purged > 0 || report.failed > 0 {
            info!(
                "Retention sweep: {} expired job(s) purged, {} deferred",
                report.purged, report.failed
            );
        }
        Ok(report)
    }

    fn remove_files(&self, job: &JobRow) -> Result<usize, StorageError> {
        let mut removed = 0;
        for path in self.paths_for(job) {
            if remove_tree(&path)? {
                debug!("Removed {}", redact_path(&path));
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// The stored result directory (or the computed one when never set) and
    /// the upload directory.
    fn paths_for(&self, job: &JobRow) -> Vec<PathBuf> {
        let mut paths = vec![self.layout.results_path(job.user_id, &job.id)];
        if let Some(stored) = job.result_dir.as_deref().map(PathBuf::from) {
            if !paths.contains(&stored) {
                paths.push(stored);
            }
        }
        paths.push(self.layout.uploads_path(job.user_id, &job.id));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{artifact_repo, ArtifactRow, Database, NewJob};
    use crate::model::ArtifactKind;
    use chrono::Duration;
    use tempfile::TempDir;

    fn insert_job(db: &Database, created_at: DateTime<Utc>) -> JobRow {
        let job = NewJob {
            user_id: 5,
            title: "structure".to_string(),
            pipeline: "alphafold".to_string(),
            ..Default::default()
        }
        .into_row(created_at, Duration::days(7));
        job_repo::insert(db, &job).unwrap();
        job
    }

    #[test]
    fn test_sweep_purges_expired_jobs_and_trees() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path(), "results", "uploads");
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let expired = insert_job(&db, now - Duration::days(8));
        let fresh = insert_job(&db, now - Duration::days(1));

        let results = layout.results_dir(5, &expired.id).unwrap();
        std::fs::write(results.join("ranked_0.pdb"), b"ATOM").unwrap();
        layout
            .save_uploads(5, &expired.id, [("input.fasta", b">s".as_slice())])
            .unwrap();
        artifact_repo::insert(
            &db,
            &ArtifactRow::new(
                &expired.id,
                &results.join("ranked_0.pdb").to_string_lossy(),
                ArtifactKind::Structure,
                "chemical/x-pdb",
                4,
                now,
            ),
        )
        .unwrap();

        let sweeper = RetentionSweeper::new(layout.clone());
        let mut uow = UnitOfWork::begin(&db);
        let report = sweeper.sweep(&mut uow, now).unwrap();
        assert_eq!(report, SweepReport { purged: 1, failed: 0 });

        // Files go immediately, records only at commit.
        assert!(!layout.results_path(5, &expired.id).exists());
        assert!(!layout.uploads_path(5, &expired.id).exists());
        assert!(job_repo::find_by_id(&db, &expired.id).unwrap().is_some());

        uow.commit().unwrap();
        assert!(job_repo::find_by_id(&db, &expired.id).unwrap().is_none());
        assert!(job_repo::find_by_id(&db, &fresh.id).unwrap().is_some());
        assert_eq!(artifact_repo::count_all(&db).unwrap(), 0);
    }

    #[test]
    fn test_sweep_tolerates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path(), "results", "uploads");
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let expired = insert_job(&db, now - Duration::days(30));

        let sweeper = RetentionSweeper::new(layout);
        let mut uow = UnitOfWork::begin(&db);
        assert_eq!(sweeper.sweep(&mut uow, now).unwrap().purged, 1);
        uow.commit().unwrap();
        assert!(job_repo::find_by_id(&db, &expired.id).unwrap().is_none());
    }

    #[test]
    fn test_expiry_is_strict() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path(), "results", "uploads");
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job = insert_job(&db, now - Duration::days(7));

        let sweeper = RetentionSweeper::new(layout);
        let mut uow = UnitOfWork::begin(&db);
        assert_eq!(sweeper.sweep(&mut uow, job.expires_at).unwrap().purged, 0);
        assert!(uow.is_empty());
    }

    #[test]
    fn test_stored_result_dir_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path(), "results", "uploads");
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let mut job = insert_job(&db, now - Duration::days(10));

        let legacy_dir = temp_dir.path().join("legacy-results");
        std::fs::create_dir_all(&legacy_dir).unwrap();
        job.result_dir = Some(legacy_dir.to_string_lossy().into_owned());
        job_repo::update(&db, &job).unwrap();

        let sweeper = RetentionSweeper::new(layout);
        let mut uow = UnitOfWork::begin(&db);
        sweeper.sweep(&mut uow, now).unwrap();
        assert!(!legacy_dir.exists());
    }

    #[test]
    fn test_failed_removal_keeps_only_that_job() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path(), "results", "uploads");
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let mut stuck = insert_job(&db, now - Duration::days(9));
        let purged = insert_job(&db, now - Duration::days(8));

        // A path below a regular file cannot be inspected, even by root.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        stuck.result_dir = Some(blocker.join("results").to_string_lossy().into_owned());
        job_repo::update(&db, &stuck).unwrap();
        let purged_results = layout.results_dir(5, &purged.id).unwrap();

        let sweeper = RetentionSweeper::new(layout);
        let mut uow = UnitOfWork::begin(&db);
        let report = sweeper.sweep(&mut uow, now).unwrap();
        assert_eq!(report, SweepReport { purged: 1, failed: 1 });
        uow.commit().unwrap();

        assert!(job_repo::find_by_id(&db, &stuck.id).unwrap().is_some());
        assert!(job_repo::find_by_id(&db, &purged.id).unwrap().is_none());
        assert!(!purged_results.exists());

        // Still failing on the next sweep; the record stays.
        let mut uow = UnitOfWork::begin(&db);
        assert_eq!(sweeper.sweep(&mut uow, now).unwrap().failed, 1);
        assert!(uow.is_empty());
    }
}
