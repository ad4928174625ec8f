//! HTTP/WebSocket server
//!
//! Thin axum layer over the pipeline, store, task service and hub. Every
//! failure response is a JSON body with a human-readable `error` string.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{error, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::error::{PipelineError, StoreError, TaskError};
use crate::gateway::{CallCounter, CapabilityGateway, GeminiGateway};
use crate::hub::BroadcastHub;
use crate::pipeline::{SaveRequest, SessionPipeline};
use crate::store::RecordStore;
use crate::tasks::{run_task_fanout, TaskService};
use crate::ws::{dashboard_ws_handler, extension_ws_handler};

const DEFAULT_SESSION_LIST_LIMIT: u64 = 50;
const DEFAULT_TASK_LIST_LIMIT: u64 = 100;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub hub: Arc<BroadcastHub>,
    pub pipeline: Arc<SessionPipeline>,
    pub tasks: Arc<TaskService>,
    pub gateway: Arc<dyn CapabilityGateway>,
}

impl AppState {
    /// Wire the full stack around a store and gateway. The task fan-out
    /// listener is spawned here so every insert path announces.
    pub fn build(store: RecordStore, gateway: Arc<dyn CapabilityGateway>) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let pipeline = Arc::new(SessionPipeline::new(
            gateway.clone(),
            store.clone(),
            hub.clone(),
        ));
        let tasks = Arc::new(TaskService::new(
            gateway.clone(),
            store.clone(),
            hub.clone(),
        ));
        tokio::spawn(run_task_fanout(store.clone(), hub.clone()));
        AppState {
            store,
            hub,
            pipeline,
            tasks,
            gateway,
        }
    }
}

/// Full route table; tests mount this on a port-0 listener.
/// An empty origin list means any origin is allowed.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring unparseable allowed origin: {}", origin);
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(health_handler))
        .route("/sessions/save", post(save_session_handler))
        .route("/sessions/notify_start", post(notify_start_handler))
        .route("/sessions/search", get(search_sessions_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/tasks/suggest", post(suggest_tasks_handler))
        .route("/tasks", get(list_tasks_handler))
        .route(
            "/tasks/{id}",
            patch(update_task_handler).delete(delete_task_handler),
        )
        .route("/tasks/{id}/execute", post(execute_task_handler))
        .route("/ws/dashboard", get(dashboard_ws_handler))
        .route("/ws/extension", get(extension_ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Entry point for the serve subcommand
pub fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let api_key = config.resolve_api_key()?;

    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", config.port);
    println!("Available endpoints:");
    println!("  GET  /                    - health");
    println!("  POST /sessions/save       - run the session pipeline");
    println!("  POST /sessions/notify_start - announce an upcoming session");
    println!("  GET  /sessions            - recent sessions");
    println!("  GET  /sessions/search?q=  - semantic session search");
    println!("  POST /tasks/suggest       - generate task suggestions");
    println!("  GET  /tasks               - list suggested tasks");
    println!("  GET  /ws/dashboard        - dashboard event stream");
    println!("  GET  /ws/extension        - extension task sync");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = db::open_database_pool(&config.db_path).await?;
        db::init_database_schema(&pool).await?;
        let store = RecordStore::new(pool);

        let gateway: Arc<dyn CapabilityGateway> = Arc::new(GeminiGateway::new(
            api_key,
            config.model.clone(),
            config.workspace_url.clone(),
            Arc::new(CallCounter::new()),
        ));
        let state = AppState::build(store, gateway);
        let app = build_router(state, &config.allowed_origins);

        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", config.port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", config.port, e))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn error_body(status: StatusCode, message: String) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

fn store_error_response(e: StoreError) -> (StatusCode, Json<Value>) {
    match e {
        StoreError::NotFound(id) => {
            error_body(StatusCode::NOT_FOUND, format!("not found: {}", id))
        }
        StoreError::InvalidRecord(msg) => error_body(StatusCode::BAD_REQUEST, msg),
        StoreError::Database(e) => {
            error!("Database error: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
        }
    }
}

fn task_error_response(e: TaskError) -> (StatusCode, Json<Value>) {
    match e {
        TaskError::InvalidTransition { .. } => error_body(StatusCode::CONFLICT, e.to_string()),
        TaskError::InvalidTask(_) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        TaskError::Store(e) => store_error_response(e),
        TaskError::Gateway(e) => error_body(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "session_hub" }))
}

// ===================== sessions =====================

#[derive(Debug, Deserialize)]
struct SavePayload {
    title: String,
    source_url: String,
    #[serde(default)]
    duration_seconds: u64,
    /// Base64-encoded audio bytes
    audio_data: String,
    mime_type: String,
    temporary_id: Option<String>,
    video_url: Option<String>,
}

async fn save_session_handler(
    State(state): State<AppState>,
    Json(payload): Json<SavePayload>,
) -> impl IntoResponse {
    let audio = match BASE64.decode(payload.audio_data.as_bytes()) {
        Ok(audio) => audio,
        Err(e) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("audio_data is not valid base64: {}", e),
            )
            .into_response()
        }
    };

    let request = SaveRequest {
        title: payload.title,
        source_url: payload.source_url,
        duration_seconds: payload.duration_seconds,
        audio,
        mime_type: payload.mime_type,
        temporary_id: payload.temporary_id,
        video_url: payload.video_url,
    };
    match state.pipeline.process_session(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(PipelineError::InvalidRequest(msg)) => {
            error_body(StatusCode::BAD_REQUEST, msg).into_response()
        }
        Err(e) => error_body(StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct NotifyStartPayload {
    title: String,
    source_url: String,
    #[serde(default)]
    duration_seconds: u64,
}

async fn notify_start_handler(
    State(state): State<AppState>,
    Json(payload): Json<NotifyStartPayload>,
) -> impl IntoResponse {
    let temporary_id = state.pipeline.announce_start(
        &payload.title,
        &payload.source_url,
        payload.duration_seconds,
    );
    Json(json!({ "temporary_id": temporary_id }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u64>,
}

async fn list_sessions_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_SESSION_LIST_LIMIT);
    match state.store.list_sessions(limit).await {
        Ok(sessions) => Json(json!({ "sessions": sessions })).into_response(),
        Err(e) => store_error_response(e).into_response(),
    }
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.find_session(&id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => {
            error_body(StatusCode::NOT_FOUND, format!("session not found: {}", id)).into_response()
        }
        Err(e) => store_error_response(e).into_response(),
    }
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_session(&id).await {
        Ok(true) => Json(json!({ "deleted": true })).into_response(),
        Ok(false) => {
            error_body(StatusCode::NOT_FOUND, format!("session not found: {}", id)).into_response()
        }
        Err(e) => store_error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

/// Semantic lookup over stored summary embeddings. Best-effort by design:
/// an unavailable index yields an empty list, never an error.
async fn search_sessions_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    if query.q.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "query must not be empty".to_string())
            .into_response();
    }
    let embedding = state.gateway.embed(&query.q).await;
    let results = state
        .store
        .vector_search_sessions(&embedding, query.limit.unwrap_or(5))
        .await;
    Json(json!({ "sessions": results })).into_response()
}

// ===================== tasks =====================

#[derive(Debug, Deserialize)]
struct SuggestPayload {
    #[serde(default)]
    context: String,
    source_context: Option<String>,
}

async fn suggest_tasks_handler(
    State(state): State<AppState>,
    Json(payload): Json<SuggestPayload>,
) -> impl IntoResponse {
    match state
        .tasks
        .suggest(&payload.context, payload.source_context.as_deref())
        .await
    {
        Ok(tasks) => Json(json!({ "tasks": tasks })).into_response(),
        Err(e) => task_error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TaskListQuery {
    status: Option<String>,
    limit: Option<u64>,
}

async fn list_tasks_handler(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        Some(raw) => match crate::models::TaskStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_body(StatusCode::BAD_REQUEST, format!("unknown status: {}", raw))
                    .into_response()
            }
        },
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_TASK_LIST_LIMIT);
    match state.store.list_tasks(status, limit).await {
        Ok(tasks) => Json(json!({ "tasks": tasks })).into_response(),
        Err(e) => store_error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateTaskPayload {
    status: String,
}

async fn update_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTaskPayload>,
) -> impl IntoResponse {
    let next = match crate::models::TaskStatus::parse(&payload.status) {
        Some(status) => status,
        None => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("unknown status: {}", payload.status),
            )
            .into_response()
        }
    };
    match state.tasks.update_status(&id, next).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => task_error_response(e).into_response(),
    }
}

async fn delete_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tasks.delete(&id).await {
        Ok(true) => Json(json!({ "deleted": true })).into_response(),
        Ok(false) => {
            error_body(StatusCode::NOT_FOUND, format!("task not found: {}", id)).into_response()
        }
        Err(e) => task_error_response(e).into_response(),
    }
}

async fn execute_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tasks.execute(&id).await {
        Ok(result) => Json(json!({ "success": true, "result": result })).into_response(),
        Err(e) => task_error_response(e).into_response(),
    }
}
