use std::path::Path;
use std::str::FromStr;

use crate::config::schema::Settings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/settings-v1.json");

pub const ENV_STORAGE_ROOT: &str = "STORAGE_ROOT";
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_RETENTION_DAYS: &str = "RETENTION_DAYS";
pub const ENV_POLL_INTERVAL_SECONDS: &str = "POLL_INTERVAL_SECONDS";

/// Loads settings from a JSON file, applies environment overrides and
/// validates the result.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut settings: Settings = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut settings)?;
    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Overrides file values with `STORAGE_ROOT`, `DATABASE_PATH`,
/// `RETENTION_DAYS` and `POLL_INTERVAL_SECONDS` when set and non-empty.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(root) = env_value(ENV_STORAGE_ROOT) {
        settings.storage_root = root;
    }
    if let Some(path) = env_value(ENV_DATABASE_PATH) {
        settings.database_path = Some(path);
    }
    if let Some(days) = env_parsed(ENV_RETENTION_DAYS)? {
        settings.retention_days = days;
    }
    if let Some(seconds) = env_parsed(ENV_POLL_INTERVAL_SECONDS)? {
        settings.poll_interval_seconds = seconds;
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_value(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value: raw,
            }),
    }
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.storage_root.trim().is_empty() {
        return Err(invalid("storage_root must not be empty"));
    }
    if settings.poll_interval_seconds == 0 {
        return Err(invalid("poll_interval_seconds must be greater than zero"));
    }
    if settings.retention_days == 0 {
        return Err(invalid("retention_days must be greater than zero"));
    }
    if settings.shutdown_grace_seconds == 0 {
        return Err(invalid("shutdown_grace_seconds must be greater than zero"));
    }
    if settings.remote.request_timeout_seconds == 0 {
        return Err(invalid("remote.request_timeout_seconds must be greater than zero"));
    }
    if settings.results_dir == settings.uploads_dir {
        return Err(invalid("results_dir and uploads_dir must differ"));
    }
    for dir in [&settings.results_dir, &settings.uploads_dir] {
        if Path::new(dir).components().count() != 1 || dir == ".." || dir == "." {
            return Err(ConfigError::Validation {
                message: format!("'{}' must be a single directory name", dir),
            });
        }
    }
    if let Some((pipeline, _)) = settings
        .endpoints
        .iter()
        .find(|(_, endpoint)| endpoint.trim().is_empty())
    {
        return Err(ConfigError::EndpointNotConfigured(pipeline.clone()));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
