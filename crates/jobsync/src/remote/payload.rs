use serde::Serialize;
use serde_json::{json, Map, Value};

/// A staged input archive shipped inline with a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputArchive {
    pub name: String,
    pub base64: String,
}

/// Builds the `input` payload for a pipeline run.
pub fn build_pipeline_payload(
    pipeline: &str,
    parameters: Value,
    sequence: Option<&str>,
    input_archive: Option<&InputArchive>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("pipeline".to_string(), json!(pipeline));
    payload.insert("parameters".to_string(), parameters);
    if let Some(sequence) = sequence.filter(|s| !s.is_empty()) {
        payload.insert("sequence".to_string(), json!(sequence));
    }
    if let Some(archive) = input_archive {
        payload.insert("input_archive".to_string(), json!(archive));
    }
    Value::Object(payload)
}
