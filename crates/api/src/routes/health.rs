use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `healthy` when the compute backend answers, `degraded` otherwise.
    pub status: &'static str,
    pub service: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the compute backend answered its liveness probe.
    pub backend_available: bool,
}

/// GET /health -- returns service and backend health.
///
/// Always answers 200; an unreachable backend only downgrades `status`.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend_available = state.orchestrator.backend_available().await;

    let status = if backend_available { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        backend_available,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
