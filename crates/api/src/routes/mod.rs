pub mod generation;
pub mod health;
pub mod models;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /health                              service and backend liveness
///
/// /generate                            submit a generation job
/// /generate/status/{request_id}        poll job status
/// /generate/result/{request_id}        artifact bytes of a finished job
/// /generate/image/{filename}           artifact bytes by name
///
/// /checkpoints                         selectable models
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/generate", generation::router())
        .merge(models::router())
}
