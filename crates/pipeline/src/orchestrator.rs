//! Generation job orchestrator.
//!
//! Drives a job from submission to a terminal state:
//!
//! ```text
//! submit:       validate -> probe backend -> resolve seed -> build -> submit -> store Queued
//! poll:         store lookup -> fetch status -> interpret -> update record
//! fetch_result: store lookup -> require Complete + artifact -> fetch artifact
//! ```
//!
//! Progress is caller-driven: nothing happens to a job between polls.

use std::sync::Arc;

use chrono::Utc;
use imagegen_core::backend::{BackendStatus, ComputeBackend};
use imagegen_core::error::CoreError;
use imagegen_core::generation::{GenerationRequest, JobOutcome, JobRecord, JobState};
use imagegen_core::models::{self, ModelList};
use imagegen_core::workflow::WorkflowBuilder;

use crate::store::StatusStore;

/// A downloaded artifact ready to hand to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Content type for an artifact, by file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Reject names that could address anything outside the output folder.
pub fn validate_artifact_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(CoreError::InvalidRequest(format!(
            "filename: '{name}' is not a plain file name"
        )));
    }
    Ok(())
}

/// Translate a backend status document into a job outcome.
///
/// Completion wins over an error marker; a completion without a named
/// artifact is still a completion.
pub fn interpret(status: &BackendStatus) -> JobOutcome {
    if status.is_completed() {
        return JobOutcome::Completed {
            artifact: status.first_artifact().map(|a| a.filename.clone()),
        };
    }
    if let Some(error) = status.error_message() {
        return JobOutcome::Failed {
            error: error.to_string(),
        };
    }
    JobOutcome::Pending
}

/// Owns the lifecycle of generation jobs.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct JobOrchestrator {
    backend: Arc<dyn ComputeBackend>,
    builder: WorkflowBuilder,
    store: Arc<StatusStore>,
}

impl JobOrchestrator {
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        builder: WorkflowBuilder,
        store: Arc<StatusStore>,
    ) -> Self {
        Self {
            backend,
            builder,
            store,
        }
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Submit a request and register it as `Queued`.
    ///
    /// Returns as soon as the backend has assigned a job id.
    pub async fn submit(&self, request: GenerationRequest) -> Result<JobRecord, CoreError> {
        request.validate()?;

        if !self.backend.is_available().await {
            tracing::warn!("Compute backend not available, refusing submission");
            return Err(CoreError::BackendUnavailable(
                "compute backend is not responding".to_string(),
            ));
        }

        let request = self.builder.resolve_seed(&request);
        let job = self.builder.build(&request)?;
        let job_id = self.backend.submit(&job).await?;

        tracing::info!(
            job_id = %job_id,
            model = %request.model,
            seed = request.seed,
            steps = request.steps,
            "Generation job submitted",
        );

        let record = JobRecord::queued(job_id, request, Utc::now());
        Ok(self.store.insert(record).await)
    }

    /// Refresh a job's state from the backend and return the new record.
    pub async fn poll(&self, job_id: &str) -> Result<JobRecord, CoreError> {
        let handle = self
            .store
            .handle(job_id)
            .await
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;

        {
            let record = handle.lock().await;
            if record.state.is_terminal() {
                return Ok(record.clone());
            }
        }

        let outcome = match self.backend.fetch_status(job_id).await {
            Ok(status) => interpret(&status),
            // ComfyUI only writes history once execution has finished, so a
            // job we submitted that the backend has no record of is still
            // waiting or running.
            Err(CoreError::JobNotFound(_)) => JobOutcome::Pending,
            Err(e) => return Err(e),
        };

        let mut record = handle.lock().await;
        let previous = record.state;
        if record.observe(outcome, Utc::now()) {
            match record.state {
                JobState::Failed => tracing::warn!(
                    job_id,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Generation job failed",
                ),
                JobState::Complete if record.diagnostic.is_some() => tracing::warn!(
                    job_id,
                    diagnostic = record.diagnostic.as_deref().unwrap_or_default(),
                    "Generation job completed without an artifact",
                ),
                state => tracing::info!(
                    job_id,
                    from = previous.as_str(),
                    to = state.as_str(),
                    "Generation job state changed",
                ),
            }
        }
        Ok(record.clone())
    }

    /// Download the artifact of a completed job.
    pub async fn fetch_result(&self, job_id: &str) -> Result<Artifact, CoreError> {
        let record = self
            .store
            .get(job_id)
            .await
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;

        let name = record.artifact().ok_or_else(|| {
            CoreError::ResultNotReady(format!(
                "job {job_id} is {} without an artifact",
                record.state.as_str()
            ))
        })?;

        self.fetch_named(name).await
    }

    /// Download an artifact by file name.
    pub async fn fetch_artifact(&self, name: &str) -> Result<Artifact, CoreError> {
        validate_artifact_name(name)?;
        self.fetch_named(name).await
    }

    /// Checkpoints and LoRAs the backend can load.
    pub async fn list_models(&self) -> Result<ModelList, CoreError> {
        let capabilities = self.backend.list_capabilities().await?;
        Ok(models::catalog(&capabilities))
    }

    /// Liveness of the compute backend.
    pub async fn backend_available(&self) -> bool {
        self.backend.is_available().await
    }

    // ---- private helpers ----

    async fn fetch_named(&self, name: &str) -> Result<Artifact, CoreError> {
        let bytes = self.backend.fetch_artifact(name).await?;
        tracing::debug!(artifact = name, size = bytes.len(), "Artifact fetched");
        Ok(Artifact {
            name: name.to_string(),
            content_type: content_type_for(name),
            bytes,
        })
    }
}
