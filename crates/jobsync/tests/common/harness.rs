#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use jobsync::db::{artifact_repo, job_repo};
use jobsync::service::ManualClock;
use jobsync::{
    ArtifactRow, Clock, CycleReport, Database, JobClient, JobRow, NewJob, Reconciler, Settings,
    StorageLayout,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub settings: Settings,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut settings = Settings::with_storage_root(temp_dir.path().to_string_lossy());
        settings
            .endpoints
            .insert("alphafold".to_string(), "ep-alphafold".to_string());
        settings
            .endpoints
            .insert("diffdock".to_string(), "ep-diffdock".to_string());

        let db = Database::open_in_memory().expect("Failed to open database");
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let reconciler = Reconciler::new(db.clone(), &settings, clock.clone());

        Self {
            temp_dir,
            settings,
            db,
            clock,
            reconciler,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn layout(&self) -> StorageLayout {
        self.settings.layout()
    }

    /// Inserts a job created "now" and moves the clock one second forward
    /// so jobs are polled in insertion order.
    pub fn insert_job(&self, new_job: NewJob) -> JobRow {
        let job = new_job.into_row(self.clock.now(), self.settings.retention());
        job_repo::insert(&self.db, &job).expect("Failed to insert job");
        self.clock.advance(Duration::seconds(1));
        job
    }

    pub fn job(&self, id: &str) -> JobRow {
        job_repo::find_by_id(&self.db, id)
            .expect("Failed to load job")
            .expect("Job missing")
    }

    pub fn job_exists(&self, id: &str) -> bool {
        job_repo::find_by_id(&self.db, id)
            .expect("Failed to load job")
            .is_some()
    }

    pub fn artifacts(&self, job_id: &str) -> Vec<ArtifactRow> {
        artifact_repo::list_by_job(&self.db, job_id).expect("Failed to list artifacts")
    }

    pub async fn cycle(&self, client: &dyn JobClient) -> jobsync::Result<CycleReport> {
        self.reconciler.run_cycle(client).await
    }
}
