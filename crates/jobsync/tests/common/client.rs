#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use jobsync::{JobClient, RemoteError, StatusResponse};

enum Scripted {
    Status(Value),
    TransportError(String),
}

/// Answers status queries per remote job id from a queue of canned
/// responses. The last response of a queue repeats.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    queried: Mutex<Vec<String>>,
    submitted: Mutex<Vec<(String, Value)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, external_job_id: &str, body: Value) -> &Self {
        self.push(external_job_id, Scripted::Status(body))
    }

    pub fn fail(&self, external_job_id: &str, reason: &str) -> &Self {
        self.push(external_job_id, Scripted::TransportError(reason.to_string()))
    }

    /// Drops every queued response for a job.
    pub fn reset(&self, external_job_id: &str) -> &Self {
        self.responses.lock().unwrap().remove(external_job_id);
        self
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(String, Value)> {
        self.submitted.lock().unwrap().clone()
    }

    fn push(&self, external_job_id: &str, scripted: Scripted) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(external_job_id.to_string())
            .or_default()
            .push_back(scripted);
        self
    }
}

#[async_trait]
impl JobClient for ScriptedClient {
    async fn submit(&self, endpoint_id: &str, payload: &Value) -> Result<String, RemoteError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((endpoint_id.to_string(), payload.clone()));
        Ok(format!("rp-{}", submitted.len()))
    }

    async fn status(
        &self,
        endpoint_id: &str,
        external_job_id: &str,
    ) -> Result<StatusResponse, RemoteError> {
        self.queried.lock().unwrap().push(external_job_id.to_string());

        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(external_job_id);
        let scripted = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().map(|s| match s {
                Scripted::Status(body) => Scripted::Status(body.clone()),
                Scripted::TransportError(reason) => Scripted::TransportError(reason.clone()),
            }),
            None => None,
        };

        let query_error = |reason: String| RemoteError::Query {
            endpoint_id: endpoint_id.to_string(),
            external_job_id: external_job_id.to_string(),
            reason,
        };
        match scripted {
            Some(Scripted::Status(body)) => serde_json::from_value(body)
                .map_err(|e| query_error(format!("unexpected response: {}", e))),
            Some(Scripted::TransportError(reason)) => Err(query_error(reason)),
            None => Err(query_error("remote returned 404 Not Found".to_string())),
        }
    }
}
