use axum::routing::get;
use axum::Router;

use crate::handlers::models;
use crate::state::AppState;

/// Model catalog routes, merged at the `/api` root.
///
/// ```text
/// GET    /checkpoints                -> list_checkpoints
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/checkpoints", get(models::list_checkpoints))
}
