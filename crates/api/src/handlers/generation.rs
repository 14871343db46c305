//! Handlers for image generation jobs.
//!
//! Routes:
//! - `POST /generate`                       submit a job
//! - `GET  /generate/status/{request_id}`   poll job status
//! - `GET  /generate/result/{request_id}`   artifact of a finished job
//! - `GET  /generate/image/{filename}`      artifact by name

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use imagegen_core::generation::{GenerationRequest, JobRecord, JobState};
use imagegen_core::types::JobId;
use serde::Serialize;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Absolute form of the route artifacts are served from. Only its path is
/// returned to clients; the host is a placeholder for building the URL.
const IMAGE_ROUTE_BASE: &str = "http://localhost/api/generate/image";

/// Body returned when a job is accepted.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: JobId,
    pub status: JobState,
}

/// Body returned by the status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: JobId,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Failure text for `failed`, or the diagnostic of a completion that
    /// named no artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<JobRecord> for StatusResponse {
    fn from(record: JobRecord) -> Self {
        let image_url = record
            .artifact()
            .and_then(image_path);
        let error_message = match record.state {
            JobState::Failed => record.error,
            JobState::Complete => record.diagnostic,
            JobState::Queued | JobState::Processing => None,
        };
        Self {
            request_id: record.id,
            status: record.state,
            image_url,
            error_message,
        }
    }
}

/// Path of the image route for `name`, with the name percent-encoded as a
/// single path segment.
fn image_path(name: &str) -> Option<String> {
    let mut url = Url::parse(IMAGE_ROUTE_BASE).ok()?;
    url.path_segments_mut().ok()?.push(name);
    Some(url.path().to_string())
}

/// POST /api/generate
///
/// Validates the request, submits it to the compute backend and returns
/// the backend-assigned job id. A malformed body is a 400 with the
/// standard error envelope rather than axum's plain-text rejection.
pub async fn submit_generation(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let record = state.orchestrator.submit(request).await?;

    Ok(Json(SubmitResponse {
        request_id: record.id,
        status: record.state,
    }))
}

/// GET /api/generate/status/{request_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let record = state.orchestrator.poll(&request_id).await?;
    Ok(Json(StatusResponse::from(record)))
}

/// GET /api/generate/result/{request_id}
///
/// Raw artifact bytes of a completed job; 409 while it is still running.
pub async fn get_result(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let artifact = state.orchestrator.fetch_result(&request_id).await?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, artifact.content_type)],
        artifact.bytes,
    ))
}

/// GET /api/generate/image/{filename}
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let artifact = state.orchestrator.fetch_artifact(&filename).await?;
    let disposition = format!("inline; filename=\"{}\"", artifact.name);
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, artifact.content_type.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    ))
}
