//! # HTTP API Tests
//!
//! The full router mounted on a port-0 listener, exercised with reqwest.
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test --test api_test
//! ```

mod common;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::MockGateway;
use session_hub::db::create_test_pool_in_memory;
use session_hub::serve::{build_router, AppState};
use session_hub::store::RecordStore;

/// Start a server with the given gateway, returning its base URL
async fn start_server(gateway: Arc<MockGateway>) -> String {
    start_server_with_origins(gateway, &[]).await
}

async fn start_server_with_origins(gateway: Arc<MockGateway>, origins: &[String]) -> String {
    let pool = create_test_pool_in_memory().await;
    let store = RecordStore::new(pool);
    let state = AppState::build(store, gateway);
    let app = build_router(state, origins);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn save_body() -> Value {
    json!({
        "title": "Standup",
        "source_url": "https://meet.example/standup",
        "duration_seconds": 300,
        "audio_data": BASE64.encode(b"fake audio bytes"),
        "mime_type": "audio/webm",
    })
}

#[tokio::test]
async fn health_endpoint_responds() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn save_then_fetch_a_session() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/sessions/save", base))
        .json(&save_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["persisted"], true);
    let id = outcome["session_id"].as_str().unwrap().to_string();
    assert!(id.starts_with("s_"));

    let fetched: Value = client
        .get(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["title"], "Standup");
    assert_eq!(fetched["has_video"], false);
    // The embedding never leaves the store through the API
    assert!(fetched.get("summary_embedding").is_none());

    let listed: Value = client
        .get(format!("{}/sessions?limit=5", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn save_rejects_bad_payloads() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let mut not_base64 = save_body();
    not_base64["audio_data"] = json!("***not base64***");
    let response = client
        .post(format!("{}/sessions/save", base))
        .json(&not_base64)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("base64"));

    let mut bad_mime = save_body();
    bad_mime["mime_type"] = json!("text/plain");
    let response = client
        .post(format!("{}/sessions/save", base))
        .json(&bad_mime)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transcription_failure_maps_to_bad_gateway() {
    let gateway = Arc::new(MockGateway {
        transcript: None,
        ..MockGateway::default()
    });
    let base = start_server(gateway).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/sessions/save", base))
        .json(&save_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("transcription"));
}

#[tokio::test]
async fn notify_start_returns_a_temporary_id() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/sessions/notify_start", base))
        .json(&json!({
            "title": "Standup",
            "source_url": "https://meet.example",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!body["temporary_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn missing_resources_return_404_with_an_error_body() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/sessions/s_missing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let response = client
        .delete(format!("{}/sessions/s_missing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .delete(format!("{}/tasks/t_missing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_lifecycle_over_http() {
    let gateway = Arc::new(MockGateway {
        suggestions: Some(json!([
            {"title": "Reply", "description": "", "service": "gmail", "action": "create_draft", "params": {}},
            {"title": "Read up", "description": ""},
        ])),
        ..MockGateway::default()
    });
    let base = start_server(gateway).await;
    let client = reqwest::Client::new();

    let suggested: Value = client
        .post(format!("{}/tasks/suggest", base))
        .json(&json!({"context": "design review", "source_context": "https://example.com"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tasks = suggested["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    let first_id = tasks[0]["id"].as_str().unwrap();

    // Complete the first task
    let response = client
        .patch(format!("{}/tasks/{}", base, first_id))
        .json(&json!({"status": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Terminal tasks reject further transitions
    let response = client
        .patch(format!("{}/tasks/{}", base, first_id))
        .json(&json!({"status": "in_progress"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unknown status strings are a client error
    let response = client
        .patch(format!("{}/tasks/{}", base, first_id))
        .json(&json!({"status": "archived"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let pending: Value = client
        .get(format!("{}/tasks?status=pending", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let pending = pending["tasks"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["title"], "Read up");
}

#[tokio::test]
async fn execute_endpoint_runs_workspace_actions() {
    let gateway = Arc::new(MockGateway {
        suggestions: Some(json!([
            {"title": "Reply", "description": "", "service": "gmail", "action": "create_draft", "params": {}},
            {"title": "Read up", "description": ""},
        ])),
        action_result: Some(json!({"draft_id": "d-9"})),
        ..MockGateway::default()
    });
    let base = start_server(gateway).await;
    let client = reqwest::Client::new();

    let suggested: Value = client
        .post(format!("{}/tasks/suggest", base))
        .json(&json!({"context": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tasks = suggested["tasks"].as_array().unwrap();
    let actionable = tasks[0]["id"].as_str().unwrap();
    let informational = tasks[1]["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/tasks/{}/execute", base, actionable))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["draft_id"], "d-9");

    let response = client
        .post(format!("{}/tasks/{}/execute", base, informational))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_reflects_the_configured_origin_list() {
    let base = start_server_with_origins(
        Arc::new(MockGateway::default()),
        &["http://dashboard.example".to_string()],
    )
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/", base))
        .header("Origin", "http://dashboard.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://dashboard.example")
    );

    let response = client
        .get(format!("{}/", base))
        .header("Origin", "http://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn cors_allows_any_origin_when_the_list_is_empty() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/", base))
        .header("Origin", "http://anywhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn search_finds_semantically_similar_sessions() {
    let base = start_server(Arc::new(MockGateway::default())).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/sessions/save", base))
        .json(&save_body())
        .send()
        .await
        .unwrap();

    let results: Value = client
        .get(format!("{}/sessions/search?q=short%20session", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["sessions"].as_array().unwrap().len(), 1);

    let response = client
        .get(format!("{}/sessions/search?q=%20", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
