//! REST endpoints for the inbox dashboard.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::actions::handlers;
use crate::error::{DatabaseError, LlmError, MailError};
use crate::llm::LlmProvider;
use crate::mail::MailSource;
use crate::pipeline::TriageProcessor;
use crate::store::Database;

/// How many meetings or todos the list endpoints return.
const LIST_LIMIT: usize = 50;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TriageProcessor>,
    pub mail: Arc<dyn MailSource>,
    pub store: Arc<dyn Database>,
    pub llm: Arc<dyn LlmProvider>,
    pub batch_size: usize,
}

/// Build the router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/emails", get(list_emails))
        .route("/process", post(process))
        .route("/send_reply", post(send_reply))
        .route("/generate_draft", post(generate_draft))
        .route("/archive", post(archive))
        .route("/thread/{thread_id}", get(get_thread))
        .route("/meetings", get(list_meetings))
        .route("/todos", get(list_todos))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error body `{"error": "..."}` with a status derived from the source.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        warn!(error = %e, "Mail request failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        warn!(error = %e, "LLM request failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        warn!(error = %e, "Database request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

type ApiResult = Result<Response, ApiError>;

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inbox-triage"
    }))
}

/// GET /emails: the current unread batch, untouched.
async fn list_emails(State(state): State<AppState>) -> ApiResult {
    let messages = state.mail.fetch_batch(state.batch_size).await?;
    Ok(Json(messages).into_response())
}

/// POST /process: fetch a batch and triage it.
async fn process(State(state): State<AppState>) -> ApiResult {
    let outcomes = state.processor.run_once(state.batch_size).await?;
    Ok(Json(outcomes).into_response())
}

#[derive(Debug, Deserialize)]
struct SendReplyRequest {
    to: String,
    subject: String,
    body: String,
}

async fn send_reply(
    State(state): State<AppState>,
    Json(req): Json<SendReplyRequest>,
) -> ApiResult {
    let receipt = state.mail.transmit(&req.to, &req.subject, &req.body).await?;
    info!(to = %req.to, receipt = %receipt, "Reply sent from dashboard");
    Ok(Json(serde_json::json!({ "status": "sent", "receipt": receipt })).into_response())
}

#[derive(Debug, Deserialize)]
struct DraftRequest {
    email_text: String,
    #[serde(default)]
    sender: String,
}

/// POST /generate_draft: reply text only, nothing is sent or recorded.
async fn generate_draft(
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> ApiResult {
    let reply = handlers::generate_reply(state.llm.as_ref(), &req.email_text, &req.sender).await?;
    Ok(Json(serde_json::json!({ "reply": reply })).into_response())
}

#[derive(Debug, Deserialize)]
struct ArchiveRequest {
    message_id: String,
}

async fn archive(State(state): State<AppState>, Json(req): Json<ArchiveRequest>) -> ApiResult {
    state.mail.archive(&req.message_id).await?;
    Ok(Json(serde_json::json!({ "status": "archived", "message_id": req.message_id })).into_response())
}

/// GET /thread/{thread_id}: messages plus whatever memory exists.
async fn get_thread(State(state): State<AppState>, Path(thread_id): Path<String>) -> ApiResult {
    let messages = state.mail.fetch_thread(&thread_id).await?;
    let memory = state.store.get_thread_memory(&thread_id).await?;
    Ok(Json(serde_json::json!({
        "thread_id": thread_id,
        "messages": messages,
        "summary": memory.as_ref().map(|m| m.summary.clone()),
        "last_action": memory.as_ref().map(|m| m.last_action.clone()),
    }))
    .into_response())
}

async fn list_meetings(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.store.list_meetings(LIST_LIMIT).await?).into_response())
}

async fn list_todos(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.store.list_todos(LIST_LIMIT).await?).into_response())
}
