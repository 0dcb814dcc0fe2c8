pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;
pub mod remote;
pub mod retention;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use config::{load_settings, RemoteSettings, Settings};
pub use db::{ArtifactRow, Database, DatabaseError, JobRow, NewJob, UnitOfWork};
pub use error::{ConfigError, IngestError, JobsyncError, RemoteError, Result, StorageError};
pub use ingest::{IngestReport, ResultIngestor};
pub use model::{classify, ArtifactKind, JobStatus};
pub use remote::{build_pipeline_payload, InputArchive, JobClient, JobOutput, RunpodClient, StatusResponse};
pub use retention::{RetentionSweeper, SweepReport};
pub use secrets::{resolve_secret, SecretError};
pub use service::{ClientFactory, Clock, CycleReport, ReconciliationService, Reconciler, SystemClock};
pub use storage::StorageLayout;
