//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (liveness, workflow submission, history
//! retrieval, artifact download, node inventory) using [`reqwest`], and
//! implements [`ComputeBackend`] on top of it. Each call carries its own
//! fixed timeout and is never retried here.

use std::time::Duration;

use async_trait::async_trait;
use imagegen_core::backend::{BackendStatus, CapabilityDocument, ComputeBackend};
use imagegen_core::error::CoreError;
use imagegen_core::types::JobId;
use imagegen_core::workflow::JobDescription;
use serde::Deserialize;

use crate::history::{HistoryEntry, HistoryResponse};

/// Per-call timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub probe: Duration,
    pub submit: Duration,
    pub status: Duration,
    pub artifact: Duration,
    pub capabilities: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(2),
            submit: Duration::from_secs(10),
            status: Duration::from_secs(5),
            artifact: Duration::from_secs(30),
            capabilities: Duration::from_secs(5),
        }
    }
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    /// Sent with every submission so the server can attribute prompts.
    client_id: String,
    timeouts: Timeouts,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
    /// Per-node validation errors, when the server refused the workflow.
    #[serde(default)]
    pub node_errors: serde_json::Value,
}

/// Errors from the ComfyUI REST API layer.
///
/// These never leave this crate; [`ComputeBackend`] methods classify them
/// into [`CoreError`] variants.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Request(_) => None,
        }
    }

    /// Response arrived but its body was not the expected JSON.
    fn is_decode(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_decode())
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            client_id: uuid::Uuid::new_v4().to_string(),
            timeouts: Timeouts::default(),
        }
    }

    /// Override the per-call timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Check that the server answers `GET /system_stats` with 200.
    pub async fn system_stats_ok(&self) -> Result<bool, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(self.timeouts.probe)
            .send()
            .await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(self.timeouts.submit)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The returned map is
    /// empty when ComfyUI has no record of the prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(self.timeouts.status)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file via `GET /view?filename=...`.
    pub async fn view(&self, filename: &str) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename)])
            .timeout(self.timeouts.artifact)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch the node inventory via `GET /object_info`.
    pub async fn object_info(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .timeout(self.timeouts.capabilities)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Classify a transport or server failure as an unavailable backend.
fn unavailable(op: &str, err: ComfyUIApiError) -> CoreError {
    tracing::warn!(op, error = %err, "ComfyUI call failed");
    CoreError::BackendUnavailable(format!("{op}: {err}"))
}

fn is_client_error(status: Option<u16>) -> bool {
    matches!(status, Some(400..=499))
}

#[async_trait]
impl ComputeBackend for ComfyUIApi {
    async fn is_available(&self) -> bool {
        match self.system_stats_ok().await {
            Ok(up) => up,
            Err(e) => {
                tracing::debug!(api_url = %self.api_url, error = %e, "ComfyUI liveness probe failed");
                false
            }
        }
    }

    async fn submit(&self, job: &JobDescription) -> Result<JobId, CoreError> {
        let response = match self.submit_workflow(&job.workflow).await {
            Ok(response) => response,
            Err(e) if is_client_error(e.status()) || e.is_decode() => {
                tracing::warn!(kind = %job.kind, error = %e, "ComfyUI rejected workflow");
                return Err(CoreError::SubmissionRejected(e.to_string()));
            }
            Err(e) => return Err(unavailable("submit", e)),
        };

        match response.prompt_id.filter(|id| !id.trim().is_empty()) {
            Some(prompt_id) => {
                tracing::debug!(
                    prompt_id = %prompt_id,
                    queue_position = ?response.number,
                    "Workflow queued on ComfyUI",
                );
                Ok(prompt_id)
            }
            None => Err(CoreError::SubmissionRejected(format!(
                "response carried no prompt_id (node_errors: {})",
                response.node_errors
            ))),
        }
    }

    async fn fetch_status(&self, job_id: &str) -> Result<BackendStatus, CoreError> {
        let mut history = match self.get_history(job_id).await {
            Ok(history) => history,
            Err(e) if e.status() == Some(404) => {
                return Err(CoreError::JobNotFound(job_id.to_string()))
            }
            Err(e) => return Err(unavailable("fetch_status", e)),
        };

        history
            .remove(job_id)
            .map(|doc| HistoryEntry::from_value(&doc).to_status())
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))
    }

    async fn fetch_artifact(&self, name: &str) -> Result<Vec<u8>, CoreError> {
        match self.view(name).await {
            Ok(bytes) if bytes.is_empty() => Err(CoreError::ArtifactNotFound(name.to_string())),
            Ok(bytes) => Ok(bytes),
            Err(e) if is_client_error(e.status()) => {
                Err(CoreError::ArtifactNotFound(name.to_string()))
            }
            Err(e) => Err(unavailable("fetch_artifact", e)),
        }
    }

    async fn list_capabilities(&self) -> Result<CapabilityDocument, CoreError> {
        self.object_info()
            .await
            .map_err(|e| unavailable("list_capabilities", e))
    }
}
