//! One reconciliation cycle: poll every non-terminal job, apply the remote
//! status, ingest finished output, sweep expired jobs, commit.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Settings;
use crate::db::{job_repo, CommitSummary, Database, JobRow, UnitOfWork};
use crate::error::{JobsyncError, Result};
use crate::ingest::ResultIngestor;
use crate::model::JobStatus;
use crate::remote::{JobClient, StatusResponse};
use crate::retention::{RetentionSweeper, SweepReport};
use crate::service::clock::Clock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Jobs queried remotely.
    pub polled: usize,
    /// Non-terminal jobs without remote ids.
    pub not_dispatched: usize,
    /// Jobs whose remote status is not one we know.
    pub unrecognized: usize,
    pub ingested: usize,
    pub sweep: SweepReport,
    pub commit: CommitSummary,
}

pub struct Reconciler {
    db: Database,
    ingestor: ResultIngestor,
    sweeper: RetentionSweeper,
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(db: Database, settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        let layout = settings.layout();
        Self {
            db,
            ingestor: ResultIngestor::new(layout.clone()),
            sweeper: RetentionSweeper::new(layout),
            settings: settings.clone(),
            clock,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Runs one full cycle. On error nothing of the cycle is committed.
    pub async fn run_cycle(&self, client: &dyn JobClient) -> Result<CycleReport> {
        let span = info_span!("reconcile_cycle");
        self.run_cycle_inner(client).instrument(span).await
    }

    async fn run_cycle_inner(&self, client: &dyn JobClient) -> Result<CycleReport> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::begin(&self.db);
        let mut report = CycleReport::default();

        let jobs = job_repo::list_non_terminal(&self.db)?;
        debug!(count = jobs.len(), "Scanning non-terminal jobs");

        for job in jobs {
            let Some((endpoint_id, external_job_id)) = job
                .remote_ids()
                .map(|(e, x)| (e.to_string(), x.to_string()))
            else {
                report.not_dispatched += 1;
                continue;
            };

            let job_id = job.id.clone();
            let span = info_span!("reconcile_job", job_id = %job_id);
            let response = client
                .status(&endpoint_id, &external_job_id)
                .instrument(span.clone())
                .await
                .map_err(|e| {
                    error!(job_id = %job_id, error = %e, "Status query failed, aborting cycle");
                    JobsyncError::from(e)
                })?;
            report.polled += 1;

            let _entered = span.enter();
            self.apply_status(&mut uow, job, &response, &mut report)
                .inspect_err(|e| {
                    error!(job_id = %job_id, error = %e, "Job update failed, aborting cycle");
                })?;
        }

        report.sweep = self.sweeper.sweep(&mut uow, now)?;
        report.commit = uow.commit()?;

        if report.commit != CommitSummary::default() {
            info!(
                polled = report.polled,
                updated = report.commit.jobs_updated,
                artifacts = report.commit.artifacts_added,
                deleted = report.commit.jobs_deleted,
                "Reconciliation cycle committed"
            );
        }
        Ok(report)
    }

    fn apply_status(
        &self,
        uow: &mut UnitOfWork,
        mut job: JobRow,
        response: &StatusResponse,
        report: &mut CycleReport,
    ) -> Result<()> {
        let Some(status) = JobStatus::from_remote(&response.status) else {
            warn!(remote_status = %response.status, "Unrecognized remote status, leaving job unchanged");
            report.unrecognized += 1;
            return Ok(());
        };

        let now = self.clock.now();
        let mut changed = status != job.status;
        job.status = status;

        if status.is_failure() {
            let message = response.failure_text();
            changed |= message != job.error_message;
            job.error_message = message;
        }

        if status == JobStatus::Completed {
            if let Some(output) = response.ingestible_output() {
                let ingest = self.ingestor.ingest(uow, &mut job, &output, now)?;
                report.ingested += 1;
                changed |= ingest.archives_written > 0;
            }
        }

        if changed {
            debug!(status = %status, "Job status applied");
            job.updated_at = now;
            uow.stage_job_update(job);
        }
        Ok(())
    }

    /// Submits a pending job to its pipeline's endpoint and records the
    /// remote ids. A rejected submission marks the job failed.
    pub async fn dispatch_job(
        &self,
        job_id: &str,
        payload: &Value,
        client: &dyn JobClient,
    ) -> Result<JobRow> {
        let mut job = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| JobsyncError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Pending {
            return Err(JobsyncError::NotDispatchable {
                id: job.id,
                status: job.status.to_string(),
            });
        }
        let endpoint_id = self.settings.endpoint_for(&job.pipeline)?.to_string();

        let span = info_span!("dispatch_job", job_id = %job.id, pipeline = %job.pipeline);
        let submitted = client.submit(&endpoint_id, payload).instrument(span).await;

        job.updated_at = self.clock.now();
        match submitted {
            Ok(external_job_id) => {
                info!(job_id = %job.id, external_job_id = %external_job_id, "Job dispatched");
                job.endpoint_id = Some(endpoint_id);
                job.external_job_id = Some(external_job_id);
                job.status = JobStatus::Submitted;
                job_repo::update(&self.db, &job)?;
                Ok(job)
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Dispatch failed, marking job failed");
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
                job_repo::update(&self.db, &job)?;
                Err(e.into())
            }
        }
    }
}
