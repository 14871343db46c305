//! Shared helpers for API integration tests.
//!
//! Each test gets its own stand-in ComfyUI server on an ephemeral port and
//! an application router built through [`build_app_router`], so requests
//! pass through the production middleware stack and the real HTTP client.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{self, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use imagegen_comfyui::ComfyUIApi;
use imagegen_core::workflow::{FixedSeed, TemplateRegistry, WorkflowBuilder};
use imagegen_pipeline::{JobOrchestrator, StatusStore};
use serde_json::{json, Value};
use tower::ServiceExt;

use imagegen_api::config::ServerConfig;
use imagegen_api::router::build_app_router;
use imagegen_api::state::AppState;

/// Seed drawn for requests that ask for a random one.
pub const TEST_SEED: u32 = 424_242;

/// Address nothing listens on.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

// ---------------------------------------------------------------------------
// Stand-in ComfyUI
// ---------------------------------------------------------------------------

/// Mutable behaviour of the stand-in server.
#[derive(Default)]
pub struct ComfyState {
    /// Prompt id handed out by the next `/prompt` call.
    pub next_prompt_id: String,
    /// Workflows received by `/prompt`, in order.
    pub submitted: Vec<Value>,
    /// `/history/{id}` entries by prompt id. Absent ids answer `{}`.
    pub history: HashMap<String, Value>,
    /// Files served by `/view`.
    pub files: HashMap<String, Vec<u8>>,
    /// `/object_info` document.
    pub object_info: Value,
}

pub type SharedComfy = Arc<Mutex<ComfyState>>;

/// A running stand-in ComfyUI server.
pub struct StandIn {
    pub url: String,
    pub state: SharedComfy,
}

impl StandIn {
    /// Make the next submission return `prompt_id`.
    pub fn queue_prompt_id(&self, prompt_id: &str) {
        self.state.lock().unwrap().next_prompt_id = prompt_id.to_string();
    }

    /// Record a successful execution of `prompt_id` that saved `filename`.
    pub fn complete(&self, prompt_id: &str, filename: &str, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.history.insert(
            prompt_id.to_string(),
            json!({
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {"7": {"images": [{"filename": filename, "subfolder": "", "type": "output"}]}}
            }),
        );
        state.files.insert(filename.to_string(), bytes.to_vec());
    }

    /// Record a failed execution of `prompt_id`.
    pub fn fail(&self, prompt_id: &str, message: &str) {
        self.state.lock().unwrap().history.insert(
            prompt_id.to_string(),
            json!({
                "status": {"status_str": "error", "completed": false, "messages": [
                    ["execution_error", {"node_id": "5", "exception_message": message}]
                ]},
                "outputs": {}
            }),
        );
    }

    pub fn submitted(&self) -> Vec<Value> {
        self.state.lock().unwrap().submitted.clone()
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Start a stand-in ComfyUI answering the endpoints the client uses.
pub async fn spawn_comfyui() -> StandIn {
    async fn submit(State(state): State<SharedComfy>, Json(body): Json<Value>) -> Json<Value> {
        let mut state = state.lock().unwrap();
        state.submitted.push(body["prompt"].clone());
        let prompt_id = state.next_prompt_id.clone();
        Json(json!({"prompt_id": prompt_id, "number": state.submitted.len(), "node_errors": {}}))
    }

    async fn history(State(state): State<SharedComfy>, Path(id): Path<String>) -> Json<Value> {
        let state = state.lock().unwrap();
        let mut body = serde_json::Map::new();
        if let Some(entry) = state.history.get(&id) {
            body.insert(id, entry.clone());
        }
        Json(Value::Object(body))
    }

    async fn view(
        State(state): State<SharedComfy>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let state = state.lock().unwrap();
        match params.get("filename").and_then(|name| state.files.get(name)) {
            Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, "not found").into_response(),
        }
    }

    async fn object_info(State(state): State<SharedComfy>) -> Json<Value> {
        Json(state.lock().unwrap().object_info.clone())
    }

    let state: SharedComfy = Arc::new(Mutex::new(ComfyState {
        next_prompt_id: "abc123".to_string(),
        ..ComfyState::default()
    }));

    let app = Router::new()
        .route("/system_stats", routing::get(|| async { Json(json!({"system": {}})) }))
        .route("/prompt", post(submit))
        .route("/history/{id}", routing::get(history))
        .route("/view", routing::get(view))
        .route("/object_info", routing::get(object_info))
        .with_state(Arc::clone(&state));

    StandIn {
        url: serve(app).await,
        state,
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` pointing at `comfyui_api_url`.
pub fn test_config(comfyui_api_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_api_url: comfyui_api_url.to_string(),
        workflow_dir: None,
        job_retention_secs: 3600,
        job_sweep_interval_secs: 60,
    }
}

/// Build the full application router against the ComfyUI at
/// `comfyui_api_url`, with a fixed random seed.
pub fn build_test_app(comfyui_api_url: &str) -> Router {
    let config = test_config(comfyui_api_url);

    let templates = TemplateRegistry::builtin().unwrap();
    let builder = WorkflowBuilder::new(Arc::new(templates), Arc::new(FixedSeed(TEST_SEED)));
    let backend = Arc::new(ComfyUIApi::new(config.comfyui_api_url.clone()));
    let orchestrator = JobOrchestrator::new(backend, builder, Arc::new(StatusStore::new()));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::new(orchestrator),
    };

    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
