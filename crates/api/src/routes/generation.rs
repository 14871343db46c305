//! Route definitions for the `/generate` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at `/generate`.
///
/// ```text
/// POST   /                           -> submit_generation
/// GET    /status/{request_id}        -> get_status
/// GET    /result/{request_id}        -> get_result
/// GET    /image/{filename}           -> get_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generation::submit_generation))
        .route("/status/{request_id}", get(generation::get_status))
        .route("/result/{request_id}", get(generation::get_result))
        .route("/image/{filename}", get(generation::get_image))
}
