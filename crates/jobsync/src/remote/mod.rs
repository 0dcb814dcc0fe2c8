//! Client side of the remote inference service.
//!
//! [`JobClient`] is the seam the reconciliation loop depends on; the
//! production implementation is [`RunpodClient`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RemoteError;

pub mod payload;
pub mod runpod;

pub use payload::{build_pipeline_payload, InputArchive};
pub use runpod::RunpodClient;

/// Stateless request/response access to the remote compute service.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Dispatches a new remote job and returns its remote id.
    async fn submit(&self, endpoint_id: &str, payload: &Value) -> Result<String, RemoteError>;

    /// Queries the state of a remote job. Safe to repeat.
    async fn status(
        &self,
        endpoint_id: &str,
        external_job_id: &str,
    ) -> Result<StatusResponse, RemoteError>;
}

/// Body of a successful submit call. The id arrives as `id` or `jobId`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(alias = "jobId")]
    pub id: String,
}

/// Body of a successful status call.
///
/// The status arrives as `status` or `state`; the first non-empty one wins.
/// `output` stays raw JSON until the job has completed, see
/// [`StatusResponse::ingestible_output`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawStatus")]
pub struct StatusResponse {
    /// Remote status as reported, e.g. `IN_QUEUE` or `COMPLETED`.
    pub status: String,
    pub output: Option<Value>,
    pub error: Option<Value>,
    pub message: Option<Value>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl TryFrom<RawStatus> for StatusResponse {
    type Error = String;

    fn try_from(raw: RawStatus) -> Result<Self, Self::Error> {
        let status = [raw.status, raw.state]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .ok_or_else(|| "response carries neither status nor state".to_string())?;
        Ok(Self {
            status,
            output: raw.output,
            error: raw.error,
            message: raw.message,
        })
    }
}

impl StatusResponse {
    /// The remote failure description: `error`, falling back to `message`.
    pub fn failure_text(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(value_text)
            .or_else(|| self.message.as_ref().and_then(value_text))
    }

    /// The output payload read as archives, if it carries anything to
    /// ingest. Output of another shape is logged and ignored.
    pub fn ingestible_output(&self) -> Option<JobOutput> {
        let value = self.output.as_ref().filter(|v| !v.is_null())?;
        match JobOutput::deserialize(value) {
            Ok(output) if !output.is_empty() => Some(output),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Ignoring job output without archives: {}", e);
                None
            }
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Output payload of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobOutput {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub archives: Vec<ArchiveEntry>,
    /// Single-archive form, used when `archives` is absent or empty.
    #[serde(default)]
    pub archive_base64: Option<String>,
}

impl JobOutput {
    pub fn is_empty(&self) -> bool {
        self.archives.is_empty() && self.archive_base64.as_deref().map_or(true, str::is_empty)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ArchiveEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ArchiveEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One named, base64-encoded archive in a job's output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArchiveEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}
