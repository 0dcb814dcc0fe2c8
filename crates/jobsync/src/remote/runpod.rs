//! HTTP client for RunPod-style serverless endpoints.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use super::{JobClient, StatusResponse, SubmitResponse};
use crate::config::RemoteSettings;
use crate::error::{ConfigError, RemoteError};
use crate::sanitize::truncate_body;
use crate::secrets::resolve_secret;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RunpodClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

fn create_http_client(request_timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

impl RunpodClient {
    /// Builds a client from settings. Fails when no API key can be resolved.
    pub fn new(settings: &RemoteSettings) -> Result<Self, ConfigError> {
        let api_key = resolve_secret(
            settings.api_key.as_deref(),
            settings.api_key_file.as_deref(),
            settings.api_key_env_var.as_deref(),
        )?;
        Self::with_key(&settings.base_url, api_key, settings.request_timeout())
    }

    pub fn with_key(
        base_url: &str,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: create_http_client(request_timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn run_url(&self, endpoint_id: &str) -> String {
        format!("{}/{}/run", self.base_url, endpoint_id)
    }

    pub fn status_url(&self, endpoint_id: &str, external_job_id: &str) -> String {
        format!("{}/{}/status/{}", self.base_url, endpoint_id, external_job_id)
    }
}

#[async_trait]
impl JobClient for RunpodClient {
    async fn submit(&self, endpoint_id: &str, payload: &Value) -> Result<String, RemoteError> {
        let dispatch_error = |reason: String| RemoteError::Dispatch {
            endpoint_id: endpoint_id.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.run_url(endpoint_id))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "input": payload }))
            .send()
            .await
            .map_err(|e| dispatch_error(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(dispatch_error(format!(
                "remote returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| dispatch_error(format!("failed to read response: {}", e)))?;
        let submitted: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
            dispatch_error(format!("unexpected response ({}): {}", e, truncate_body(&body)))
        })?;
        if submitted.id.is_empty() {
            return Err(dispatch_error("response carried an empty job id".to_string()));
        }

        log::debug!("Dispatched remote job {} to endpoint {}", submitted.id, endpoint_id);
        Ok(submitted.id)
    }

    async fn status(
        &self,
        endpoint_id: &str,
        external_job_id: &str,
    ) -> Result<StatusResponse, RemoteError> {
        let query_error = |reason: String| RemoteError::Query {
            endpoint_id: endpoint_id.to_string(),
            external_job_id: external_job_id.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.status_url(endpoint_id, external_job_id))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| query_error(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(query_error(format!(
                "remote returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| query_error(format!("failed to read response: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            query_error(format!("unexpected response ({}): {}", e, truncate_body(&body)))
        })
    }
}
