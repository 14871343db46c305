use axum::extract::State;
use axum::Json;
use imagegen_core::models::ModelList;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/checkpoints
///
/// Models the backend can load, grouped into base, LoRA and merged.
pub async fn list_checkpoints(State(state): State<AppState>) -> AppResult<Json<ModelList>> {
    let models = state.orchestrator.list_models().await?;
    Ok(Json(models))
}
