//! Typed view of the ComfyUI `/history` payload.
//!
//! The raw history response is a mapping from prompt id to an entry
//! whose `outputs` field maps node ids to node-specific payloads.
//! [`job_status`] collapses that heterogeneous shape into the closed
//! [`JobStatus`] set the poller works with.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::workflow::{ArtifactShape, SlotBindings};

/// Full `/history/{prompt_id}` response body, keyed by prompt id.
///
/// ComfyUI returns an empty object until the prompt appears in its
/// history view, which can lag the submission slightly.
pub type History = HashMap<String, HistoryEntry>;

/// One prompt's history record.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Node id to output payload. Empty while the job is running.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    /// Execution status block, absent on older server versions.
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

/// The `status` block of a history entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatus {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// Raw `(kind, data)` message tuples recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// A stored artifact record as produced by a save-image output node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage class (`output`, `temp`, ...), the `type` query
    /// parameter of the `/view` endpoint.
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// Reference to the produced artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    /// Stored on the backend; fetch the bytes via `/view`.
    Stored(StoredRef),
    /// Base64 payload embedded directly in the history response.
    Inline(String),
}

/// Observed state of one job, derived from a single history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The prompt has not appeared in the history view yet.
    Pending,
    /// The prompt is known but has produced no outputs.
    Running,
    /// Terminal: the output node produced an artifact.
    Succeeded(ArtifactRef),
    /// Terminal: the backend recorded an execution error.
    Failed(String),
}

/// Errors while reading the artifact out of a terminal history entry.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Outputs exist but the bound output node produced nothing --
    /// a downstream node failed without an execution error.
    #[error("Job finished without output from node {node_id}")]
    MissingOutput { node_id: String },

    /// The output node's payload does not have the configured shape.
    #[error("Unusable output from node {node_id}: {reason}")]
    MalformedOutput { node_id: String, reason: String },
}

/// Collapse one history response into a [`JobStatus`] for `prompt_id`.
pub fn job_status(
    history: &History,
    prompt_id: &str,
    bindings: &SlotBindings,
) -> Result<JobStatus, OutputError> {
    let Some(entry) = history.get(prompt_id) else {
        return Ok(JobStatus::Pending);
    };

    if let Some(status) = &entry.status {
        if status.status_str.as_deref() == Some("error") {
            return Ok(JobStatus::Failed(error_reason(status)));
        }
    }

    if entry.outputs.is_empty() {
        return Ok(JobStatus::Running);
    }

    let payload =
        entry
            .outputs
            .get(&bindings.output_node)
            .ok_or_else(|| OutputError::MissingOutput {
                node_id: bindings.output_node.clone(),
            })?;

    extract_artifact(payload, bindings).map(JobStatus::Succeeded)
}

/// Pull a human-readable reason out of the recorded status messages.
///
/// Execution errors arrive as `["execution_error", {...}]` tuples with
/// an `exception_message` field.
fn error_reason(status: &ExecutionStatus) -> String {
    for message in &status.messages {
        if message.get(0).and_then(Value::as_str) == Some("execution_error") {
            if let Some(text) = message
                .get(1)
                .and_then(|data| data.get("exception_message"))
                .and_then(Value::as_str)
            {
                return text.to_string();
            }
        }
    }
    "Backend reported an execution error".to_string()
}

/// Read the artifact from the output node payload per the bound shape.
fn extract_artifact(payload: &Value, bindings: &SlotBindings) -> Result<ArtifactRef, OutputError> {
    let malformed = |reason: &str| OutputError::MalformedOutput {
        node_id: bindings.output_node.clone(),
        reason: reason.to_string(),
    };

    let first = payload
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .ok_or_else(|| malformed("no images entry"))?;

    match bindings.artifact_shape {
        ArtifactShape::Reference => serde_json::from_value::<StoredRef>(first.clone())
            .map(ArtifactRef::Stored)
            .map_err(|e| malformed(&e.to_string())),
        ArtifactShape::Inline => first
            .as_str()
            .map(|s| ArtifactRef::Inline(s.to_string()))
            .ok_or_else(|| malformed("expected an inline base64 string")),
    }
}
