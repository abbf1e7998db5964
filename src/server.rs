//! HTTP edge for the chat pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ai/chat` | Plain-text query in, plain-text answer out |
//! | `POST` | `/api/ai/chat/trace` | `{"query": "..."}` in, full [`PipelineResult`] out |
//! | `GET`  | `/health` | Health check (returns version and model) |
//!
//! The chat endpoints always answer `200`: every pipeline failure has
//! already been turned into a user-safe message. Only malformed trace
//! requests get an error body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "..." } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser chat clients
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::models::PipelineResult;
use crate::orchestrator::ChatOrchestrator;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
    model: Arc<str>,
}

/// Starts the HTTP server on `[server].bind` with the configured model and
/// store. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = ChatOrchestrator::from_config(config).await?;
    run_server_with(config, Arc::new(orchestrator)).await
}

/// Starts the HTTP server around an already-built orchestrator.
pub async fn run_server_with(
    config: &Config,
    orchestrator: Arc<ChatOrchestrator>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(orchestrator, &config.inference.model);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, model = %config.inference.model, "chat server listening");
    println!("Chat server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The application router, without binding a socket.
pub fn router(orchestrator: Arc<ChatOrchestrator>, model: &str) -> Router {
    let state = AppState {
        orchestrator,
        model: Arc::from(model),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ai/chat", post(handle_chat))
        .route("/api/ai/chat/trace", post(handle_chat_trace))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.model.to_string(),
    })
}

// ============ POST /api/ai/chat ============

async fn handle_chat(State(state): State<AppState>, body: String) -> String {
    state.orchestrator.process(&body).await.text
}

// ============ POST /api/ai/chat/trace ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
}

async fn handle_chat_trace(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<PipelineResult>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    Ok(Json(state.orchestrator.process(&request.query).await))
}
