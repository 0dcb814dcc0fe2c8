use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::storage::StorageLayout;

pub const DEFAULT_DATABASE_FILE: &str = "jobsync.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage_root: String,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    #[serde(default)]
    pub remote: RemoteSettings,
    /// Pipeline key to remote endpoint id.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_retention_days() -> u32 {
    7
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

impl Settings {
    /// Settings with every default applied, rooted at `storage_root`.
    pub fn with_storage_root(storage_root: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            uploads_dir: default_uploads_dir(),
            results_dir: default_results_dir(),
            database_path: None,
            retention_days: default_retention_days(),
            poll_interval_seconds: default_poll_interval_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            remote: RemoteSettings::default(),
            endpoints: HashMap::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// How long a job is kept after creation.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.storage_root).join(DEFAULT_DATABASE_FILE),
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.storage_root, &self.results_dir, &self.uploads_dir)
    }

    /// Remote endpoint id serving `pipeline`.
    pub fn endpoint_for(&self, pipeline: &str) -> Result<&str, ConfigError> {
        self.endpoints
            .get(pipeline)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigError::EndpointNotConfigured(pipeline.to_string()))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

pub const DEFAULT_API_KEY_ENV_VAR: &str = "RUNPOD_API_KEY";

fn default_base_url() -> String {
    "https://api.runpod.ai/v2".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some(DEFAULT_API_KEY_ENV_VAR.to_string())
}

fn default_request_timeout_seconds() -> u64 {
    60
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_file", &self.api_key_file)
            .field("api_key_env_var", &self.api_key_env_var)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}
