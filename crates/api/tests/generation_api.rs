//! Integration tests for the `/api/generate` and `/api/checkpoints` routes,
//! driven through the full router against a stand-in ComfyUI.

mod common;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post_json, spawn_comfyui, TEST_SEED, UNREACHABLE_URL};
use imagegen_core::generation::MISSING_ARTIFACT_DIAGNOSTIC;
use serde_json::json;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

// ---------------------------------------------------------------------------
// Test: submit, poll, complete, fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_poll_and_fetch_end_to_end() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = post_json(
        app.clone(),
        "/api/generate",
        r#"{"prompt":"a cat","model":"sdxl.safetensors","steps":20,"cfg":7.0,"seed":-1}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json, json!({"request_id": "abc123", "status": "queued"}));

    // The workflow sent to the backend carries the request values.
    let submitted = comfy.submitted();
    assert_eq!(submitted.len(), 1);
    let workflow = &submitted[0];
    assert_eq!(workflow["1"]["inputs"]["ckpt_name"], "sdxl.safetensors");
    assert_eq!(workflow["2"]["inputs"]["text"], "a cat");
    assert_eq!(workflow["3"]["inputs"]["text"], "blurry, low quality");
    assert_eq!(workflow["5"]["inputs"]["seed"], json!(TEST_SEED));
    assert_eq!(workflow["5"]["inputs"]["steps"], json!(20));

    // Nothing in history yet: still running.
    let json = body_json(get(app.clone(), "/api/generate/status/abc123").await).await;
    assert_eq!(json, json!({"request_id": "abc123", "status": "processing"}));

    // Result is not ready while the job runs.
    let response = get(app.clone(), "/api/generate/result/abc123").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "RESULT_NOT_READY");

    comfy.complete("abc123", "out.png", PNG);

    let json = body_json(get(app.clone(), "/api/generate/status/abc123").await).await;
    assert_eq!(json["status"], "complete");
    assert_eq!(json["image_url"], "/api/generate/image/out.png");
    assert!(json.get("error_message").is_none());

    let response = get(app.clone(), "/api/generate/result/abc123").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(response).await, PNG);

    let response = get(app, "/api/generate/image/out.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "inline; filename=\"out.png\""
    );
    assert_eq!(body_bytes(response).await, PNG);
}

#[tokio::test]
async fn explicit_seed_is_passed_through() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = post_json(
        app,
        "/api/generate",
        r#"{"prompt":"a cat","model":"m.safetensors","seed":12345,"negative_prompt":"dogs"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let workflow = &comfy.submitted()[0];
    assert_eq!(workflow["5"]["inputs"]["seed"], json!(12345));
    assert_eq!(workflow["3"]["inputs"]["text"], "dogs");
}

// ---------------------------------------------------------------------------
// Test: backend-reported failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_reports_error_message() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    post_json(app.clone(), "/api/generate", r#"{"prompt":"a cat","model":"m"}"#).await;
    comfy.fail("abc123", "CUDA out of memory");

    let response = get(app.clone(), "/api/generate/status/abc123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_message"], "CUDA out of memory");
    assert!(json.get("image_url").is_none());

    let response = get(app, "/api/generate/result/abc123").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn image_url_with_spaces_round_trips() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    post_json(app.clone(), "/api/generate", r#"{"prompt":"a cat","model":"m"}"#).await;
    comfy.complete("abc123", "my cat #1.png", PNG);

    let json = body_json(get(app.clone(), "/api/generate/status/abc123").await).await;
    let image_url = json["image_url"].as_str().unwrap().to_string();
    assert_eq!(image_url, "/api/generate/image/my%20cat%20%231.png");

    let response = get(app, &image_url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, PNG);
}

#[tokio::test]
async fn completion_without_filename_is_degraded_not_unavailable() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    post_json(app.clone(), "/api/generate", r#"{"prompt":"a cat","model":"m"}"#).await;
    comfy.state.lock().unwrap().history.insert(
        "abc123".to_string(),
        json!({
            "status": {"completed": true},
            "outputs": {"7": {"images": [{"subfolder": "", "type": "temp"}]}}
        }),
    );

    let response = get(app.clone(), "/api/generate/status/abc123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "complete");
    assert_eq!(json["error_message"], MISSING_ARTIFACT_DIAGNOSTIC);
    assert!(json.get("image_url").is_none());

    let response = get(app, "/api/generate/result/abc123").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn structured_error_marker_fails_the_job() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    post_json(app.clone(), "/api/generate", r#"{"prompt":"a cat","model":"m"}"#).await;
    comfy.state.lock().unwrap().history.insert(
        "abc123".to_string(),
        json!({
            "status": {"completed": false, "error": {"message": "boom", "type": "RuntimeError"}},
            "outputs": {}
        }),
    );

    let response = get(app, "/api/generate/status/abc123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "failed");
    assert!(json["error_message"].as_str().unwrap().contains("boom"));
}

// ---------------------------------------------------------------------------
// Test: error envelopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_request_id_returns_404() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = get(app, "/api/generate/status/nonexistent-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "JOB_NOT_FOUND");
    assert_eq!(json["error"], "Job nonexistent-id not found");
}

#[tokio::test]
async fn unavailable_backend_returns_503() {
    let app = common::build_test_app(UNREACHABLE_URL);

    let response = post_json(app, "/api/generate", r#"{"prompt":"a cat","model":"m"}"#).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn malformed_body_returns_400() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = post_json(app, "/api/generate", r#"{"prompt": "a cat""#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    assert!(comfy.submitted().is_empty());
}

#[tokio::test]
async fn invalid_request_returns_400_without_submitting() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = post_json(app, "/api/generate", r#"{"prompt":"  ","model":"m"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_REQUEST");
    assert!(comfy.submitted().is_empty());
}

#[tokio::test]
async fn missing_image_returns_404() {
    let comfy = spawn_comfyui().await;
    let app = common::build_test_app(&comfy.url);

    let response = get(app, "/api/generate/image/gone.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "ARTIFACT_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: model catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkpoints_are_grouped_by_category() {
    let comfy = spawn_comfyui().await;
    comfy.state.lock().unwrap().object_info = json!({
        "CheckpointLoaderSimple": {"input": {"required": {"ckpt_name": [[
            "base/sdxl_base.safetensors",
            "user_models/merged_portrait.safetensors"
        ]]}}},
        "LoraLoader": {"input": {"required": {"lora_name": [["detail_lora.safetensors"]]}}}
    });
    let app = common::build_test_app(&comfy.url);

    let response = get(app, "/api/checkpoints").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_count"], 3);
    assert_eq!(json["base"][0]["filename"], "base/sdxl_base.safetensors");
    assert_eq!(json["merged"][0]["display_name"], "merged_portrait");
    assert_eq!(json["lora"][0]["category"], "lora");
}

#[tokio::test]
async fn checkpoints_with_unavailable_backend_returns_503() {
    let app = common::build_test_app(UNREACHABLE_URL);
    let response = get(app, "/api/checkpoints").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
