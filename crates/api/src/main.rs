use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use imagegen_comfyui::ComfyUIApi;
use imagegen_core::workflow::{TemplateRegistry, ThreadRngSeeds, WorkflowBuilder};
use imagegen_pipeline::{retention, JobOrchestrator, RetentionPolicy, StatusStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagegen_api::config::ServerConfig;
use imagegen_api::router::build_app_router;
use imagegen_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagegen_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        comfyui_api_url = %config.comfyui_api_url,
        "Loaded server configuration"
    );

    // --- Workflow templates ---
    let templates = match &config.workflow_dir {
        Some(dir) => TemplateRegistry::with_dir(dir)
            .unwrap_or_else(|e| panic!("Failed to load workflow templates from {}: {e}", dir.display())),
        None => TemplateRegistry::builtin().expect("Built-in workflow templates must parse"),
    };
    tracing::info!(kinds = ?templates.kinds(), "Workflow templates loaded");
    let builder = WorkflowBuilder::new(Arc::new(templates), Arc::new(ThreadRngSeeds));

    // --- Compute backend ---
    let backend = Arc::new(ComfyUIApi::new(config.comfyui_api_url.clone()));

    // --- Job orchestration ---
    let store = Arc::new(StatusStore::new());
    let orchestrator = Arc::new(JobOrchestrator::new(backend, builder, Arc::clone(&store)));

    // Spawn retention sweeper (drops stale job records).
    let retention_cancel = CancellationToken::new();
    let policy = RetentionPolicy::from_ttl(chrono::Duration::seconds(
        i64::try_from(config.job_retention_secs).expect("JOB_RETENTION_SECS out of range"),
    ));
    let retention_handle = tokio::spawn(retention::run(
        Arc::clone(&store),
        policy,
        Duration::from_secs(config.job_sweep_interval_secs.max(1)),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Retention sweeper stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
