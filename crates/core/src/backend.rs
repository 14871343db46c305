//! Seam between the orchestrator and the compute backend.
//!
//! [`ComputeBackend`] is implemented by the ComfyUI HTTP client and by
//! in-process fakes in tests. Implementations must normalize every
//! transport failure into a [`CoreError`] variant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;
use crate::workflow::JobDescription;

/// Backend capability inventory (ComfyUI `/object_info`): node class ->
/// declared inputs. Kept semi-structured; see [`crate::models`].
pub type CapabilityDocument = serde_json::Value;

/// Operations the orchestrator needs from a compute backend.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Lightweight liveness probe. Never fails; `false` on any error.
    async fn is_available(&self) -> bool;

    /// Queue a job and return the backend-assigned id.
    async fn submit(&self, job: &JobDescription) -> Result<JobId, CoreError>;

    /// Fetch the current status document for a job.
    async fn fetch_status(&self, job_id: &str) -> Result<BackendStatus, CoreError>;

    /// Download a generated artifact by filename.
    async fn fetch_artifact(&self, name: &str) -> Result<Vec<u8>, CoreError>;

    /// Fetch the backend's model / operator inventory.
    async fn list_capabilities(&self) -> Result<CapabilityDocument, CoreError>;
}

/// One named artifact inside a node's output listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Empty when the backend listed an output without naming it.
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output`, `temp` or `input`.
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Outputs produced by one workflow node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub node_id: String,
    pub artifacts: Vec<ArtifactRef>,
}

/// Backend-neutral view of a job's status document.
///
/// Only three things are guaranteed by the backend: a completion flag, an
/// optional error, and an output listing that may name zero or more
/// artifacts. Everything else in the raw document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStatus {
    completed: bool,
    error: Option<String>,
    outputs: Vec<NodeOutput>,
}

impl BackendStatus {
    pub fn new(completed: bool, error: Option<String>, outputs: Vec<NodeOutput>) -> Self {
        Self {
            completed,
            error,
            outputs,
        }
    }

    /// Status of a job the backend knows about but has not finished.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn outputs(&self) -> &[NodeOutput] {
        &self.outputs
    }

    /// First output entry that names an artifact, in node order.
    pub fn first_artifact(&self) -> Option<&ArtifactRef> {
        self.outputs
            .iter()
            .flat_map(|o| o.artifacts.iter())
            .find(|a| !a.filename.is_empty())
    }
}
