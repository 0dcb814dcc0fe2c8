//! Job status state machine and artifact classification.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// `Pending`, `Submitted`, `Queued` and `Running` are polled by the
/// reconciliation loop; every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Submitted,
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    CompletedWithErrors,
}

impl JobStatus {
    /// Statuses the reconciliation loop still polls.
    pub const NON_TERMINAL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Submitted,
        JobStatus::Queued,
        JobStatus::Running,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Submitted => "submitted",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
            JobStatus::CompletedWithErrors => "completed_with_errors",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !Self::NON_TERMINAL.contains(self)
    }

    /// Terminal statuses that carry a remote error message.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed
                | JobStatus::TimedOut
                | JobStatus::Cancelled
                | JobStatus::CompletedWithErrors
        )
    }

    /// Maps a status reported by the remote service. Matching is
    /// case-insensitive and otherwise verbatim.
    pub fn from_remote(raw: &str) -> Option<Self> {
        raw.trim().to_lowercase().parse().ok()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "submitted" => Ok(JobStatus::Submitted),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "timed_out" => Ok(JobStatus::TimedOut),
            "cancelled" => Ok(JobStatus::Cancelled),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Classification of a produced output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Generic,
    Structure,
    Table,
    Html,
    Archive,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Generic => "generic",
            ArtifactKind::Structure => "structure",
            ArtifactKind::Table => "table",
            ArtifactKind::Html => "html",
            ArtifactKind::Archive => "archive",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(ArtifactKind::Generic),
            "structure" => Ok(ArtifactKind::Structure),
            "table" => Ok(ArtifactKind::Table),
            "html" => Ok(ArtifactKind::Html),
            "archive" => Ok(ArtifactKind::Archive),
            other => Err(format!("unknown artifact kind '{}'", other)),
        }
    }
}

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";
pub const MIME_GZIP: &str = "application/gzip";
pub const MIME_TAR: &str = "application/x-tar";

/// Classifies an indexed result file by its extension.
pub fn classify(path: &Path) -> (ArtifactKind, &'static str) {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdb") => (ArtifactKind::Structure, "chemical/x-pdb"),
        Some("cif") => (ArtifactKind::Structure, "chemical/x-cif"),
        Some("json") => (ArtifactKind::Table, "application/json"),
        Some("csv") => (ArtifactKind::Table, "text/csv"),
        Some("html") => (ArtifactKind::Html, "text/html"),
        _ => (ArtifactKind::Generic, MIME_OCTET_STREAM),
    }
}
