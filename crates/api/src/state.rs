use std::sync::Arc;

use imagegen_pipeline::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job submission, polling and artifact retrieval.
    pub orchestrator: Arc<JobOrchestrator>,
}
