//! Resolves the remote API key.
//!
//! Sources are tried in a fixed order and the first one configured wins:
//! an inline `api_key`, then `api_key_file` (for mounted container secrets),
//! then the variable named by `api_key_env_var`. A configured source that
//! yields nothing is an error; later sources are not consulted.

use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no API key source configured (set api_key, api_key_file or api_key_env_var)")]
    NoSourceProvided,

    #[error("cannot read API key file '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API key file '{}' is blank", path.display())]
    BlankFile { path: PathBuf },

    #[error("environment variable '{0}' is not set")]
    EnvMissing(String),

    #[error("environment variable '{0}' is not valid UTF-8")]
    EnvNotUnicode(String),
}

enum Source<'a> {
    Inline(&'a str),
    File(&'a str),
    Env(&'a str),
}

pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    let source = given(direct)
        .map(Source::Inline)
        .or_else(|| given(file_path).map(Source::File))
        .or_else(|| given(env_var).map(Source::Env))
        .ok_or(SecretError::NoSourceProvided)?;

    let value = match source {
        Source::Inline(value) => value.to_string(),
        Source::File(raw) => read_key_file(home_relative(raw))?,
        Source::Env(name) => match std::env::var(name) {
            Ok(value) => value.trim().to_string(),
            Err(std::env::VarError::NotPresent) => {
                return Err(SecretError::EnvMissing(name.to_string()))
            }
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(SecretError::EnvNotUnicode(name.to_string()))
            }
        },
    };
    Ok(SecretString::from(value))
}

fn read_key_file(path: PathBuf) -> Result<String, SecretError> {
    match std::fs::read_to_string(&path) {
        Ok(content) if content.trim().is_empty() => Err(SecretError::BlankFile { path }),
        Ok(content) => Ok(content.trim().to_string()),
        Err(source) => Err(SecretError::Unreadable { path, source }),
    }
}

fn given(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// `~/x` relative to `$HOME`; anything else unchanged.
fn home_relative(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(raw),
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => PathBuf::from(raw),
    }
}
