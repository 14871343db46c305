//! ComfyUI `/history/{prompt_id}` documents.
//!
//! The endpoint answers `{}` for a prompt it does not know, and otherwise
//! `{"<prompt_id>": {"status": {...}, "outputs": {...}, ...}}`. The entry
//! is read by keyed lookup: fields with an unexpected shape are treated as
//! absent instead of failing the whole document.
//!
//! ```json
//! {
//!   "abc123": {
//!     "status": {
//!       "status_str": "success",
//!       "completed": true,
//!       "messages": [["execution_start", {"prompt_id": "abc123"}]]
//!     },
//!     "outputs": {"9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]}}
//!   }
//! }
//! ```

use std::collections::HashMap;

use imagegen_core::backend::{ArtifactRef, BackendStatus, NodeOutput};
use imagegen_core::workflow::compare_node_ids;
use serde_json::Value;

/// `status_str` value ComfyUI uses for a failed execution.
const STATUS_ERROR: &str = "error";

/// Message kind carrying the exception details of a failed node.
const EXECUTION_ERROR_MESSAGE: &str = "execution_error";

/// Fallback text when the backend flags an error without a message.
const UNKNOWN_EXECUTION_ERROR: &str = "execution failed";

/// Full `/history/{id}` response, keyed by prompt id. Entries stay raw
/// until [`HistoryEntry::from_value`] reads them.
pub type HistoryResponse = HashMap<String, Value>;

/// History of one prompt.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    pub status: Option<HistoryStatus>,
    /// Image listings per node id. Entries that are not artifact objects
    /// are dropped.
    pub outputs: HashMap<String, Vec<ArtifactRef>>,
}

/// The `status` block of a history entry.
#[derive(Debug, Clone, Default)]
pub struct HistoryStatus {
    pub completed: bool,
    pub status_str: Option<String>,
    /// Explicit error marker, rendered as text when it is not a string.
    pub error: Option<String>,
    /// `[kind, data]` pairs recorded during execution.
    pub messages: Vec<(String, Value)>,
}

impl HistoryStatus {
    fn from_value(doc: &Value) -> Self {
        let messages = doc
            .get("messages")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(message_pair).collect())
            .unwrap_or_default();

        Self {
            completed: doc.get("completed").and_then(Value::as_bool).unwrap_or(false),
            status_str: doc.get("status_str").and_then(Value::as_str).map(str::to_string),
            error: doc.get("error").and_then(render_error),
            messages,
        }
    }

    /// The backend-supplied error text, if this status marks a failure.
    ///
    /// An explicit `error` field wins; otherwise a `status_str` of
    /// `"error"` takes the first `execution_error` message's text.
    pub fn error_message(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        if self.status_str.as_deref() != Some(STATUS_ERROR) {
            return None;
        }
        let message = self
            .messages
            .iter()
            .filter(|(kind, _)| kind == EXECUTION_ERROR_MESSAGE)
            .find_map(|(_, data)| data.get("exception_message").and_then(render_error))
            .unwrap_or_else(|| UNKNOWN_EXECUTION_ERROR.to_string());
        Some(message)
    }
}

impl HistoryEntry {
    /// Read one entry of a `/history` document.
    pub fn from_value(doc: &Value) -> Self {
        let status = doc
            .get("status")
            .filter(|s| s.is_object())
            .map(HistoryStatus::from_value);

        let outputs = doc
            .get("outputs")
            .and_then(Value::as_object)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|(node_id, node)| (node_id.clone(), node_images(node)))
                    .collect()
            })
            .unwrap_or_default();

        Self { status, outputs }
    }

    /// Convert to the backend-neutral status, with outputs in node order.
    pub fn to_status(&self) -> BackendStatus {
        let (completed, error) = match &self.status {
            Some(status) => (status.completed, status.error_message()),
            None => (false, None),
        };

        let mut node_ids: Vec<&String> = self.outputs.keys().collect();
        node_ids.sort_by(|a, b| compare_node_ids(a, b));
        let outputs = node_ids
            .into_iter()
            .map(|id| NodeOutput {
                node_id: id.clone(),
                artifacts: self.outputs[id].clone(),
            })
            .collect();

        BackendStatus::new(completed, error, outputs)
    }
}

// ---- helpers ----

/// `node.images[]` entries that parse as artifacts.
fn node_images(node: &Value) -> Vec<ArtifactRef> {
    node.get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| serde_json::from_value(image.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn message_pair(message: &Value) -> Option<(String, Value)> {
    let kind = message.get(0)?.as_str()?;
    let data = message.get(1).cloned().unwrap_or(Value::Null);
    Some((kind.to_string(), data))
}

/// Strings verbatim; other non-null values as their JSON text.
fn render_error(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
