use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobsyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} cannot be dispatched from status '{status}'")]
    NotDispatchable { id: String, status: String },

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value for environment variable '{name}': {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Remote API credentials unavailable: {0}")]
    MissingCredentials(#[from] crate::secrets::SecretError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("No endpoint configured for pipeline '{0}'")]
    EndpointNotConfigured(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemoveTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive '{path}': {source}")]
    BuildArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to decode archive '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error("Archive '{name}' is empty")]
    EmptyArchive { name: String },

    #[error("Failed to index '{path}': {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

impl IngestError {
    /// Decode failures only cost the affected archive entry; everything else
    /// aborts the cycle.
    pub fn is_entry_local(&self) -> bool {
        matches!(self, IngestError::Decode { .. } | IngestError::EmptyArchive { .. })
    }
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to dispatch job to endpoint '{endpoint_id}': {reason}")]
    Dispatch { endpoint_id: String, reason: String },

    #[error("Failed to query job '{external_job_id}' on endpoint '{endpoint_id}': {reason}")]
    Query {
        endpoint_id: String,
        external_job_id: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, JobsyncError>;
