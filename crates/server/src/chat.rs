//! Chat API routes.
//!
//! - `POST /api/v1/chat`                          answer one message
//! - `POST /api/v1/chat/{conversation_id}/resume`  finish an interrupted turn
//! - `GET  /api/v1/chat/{conversation_id}/history` paged transcript
//! - `GET  /api/v1/chat/conversations`              a user's threads, newest first
//! - `DELETE /api/v1/chat/{conversation_id}`        drop a thread

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use parley_agent::{ChatRuntime, TurnOutcome};
use parley_core::domain::checkpoint::ConversationSummary;
use parley_core::domain::conversation::{ChatMessage, Intent};
use parley_core::domain::degradation::Degradation;
use parley_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_CONVERSATION_LIMIT: u32 = 20;
const ANONYMOUS_USER: &str = "anonymous";

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<ChatRuntime>,
}

impl ChatState {
    pub fn new(runtime: Arc<ChatRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            response: outcome.answer,
            conversation_id: outcome.thread_id,
            intent: outcome.intent,
            degradations: outcome.degradations,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationListQuery {
    pub user_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/v1/chat", post(post_chat))
        .route("/api/v1/chat/{conversation_id}/resume", post(resume_chat))
        .route("/api/v1/chat/{conversation_id}/history", get(chat_history))
        .route("/api/v1/chat/conversations", get(list_conversations))
        .route("/api/v1/chat/{conversation_id}", delete(delete_conversation))
        .with_state(state)
}

async fn post_chat(
    State(state): State<ChatState>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let correlation_id = new_correlation_id();
    let thread_id = body
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = body.user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string());

    info!(
        event_name = "server.chat.received",
        correlation_id = %correlation_id,
        thread_id = %thread_id,
        message_chars = body.message.chars().count(),
        "chat message received"
    );

    let outcome = state
        .runtime
        .run_turn(&thread_id, &user_id, &body.message, &correlation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id, &thread_id))?;

    Ok(Json(ChatResponse::from(outcome)))
}

async fn resume_chat(
    Path(conversation_id): Path<String>,
    State(state): State<ChatState>,
) -> ApiResult<ChatResponse> {
    let correlation_id = new_correlation_id();
    let outcome = state
        .runtime
        .resume_turn(&conversation_id, &correlation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id, &conversation_id))?;

    match outcome {
        Some(outcome) => Ok(Json(ChatResponse::from(outcome))),
        None => Err(not_found(&conversation_id, correlation_id)),
    }
}

async fn chat_history(
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<ChatState>,
) -> ApiResult<HistoryResponse> {
    let correlation_id = new_correlation_id();
    let messages = state
        .runtime
        .get_history(&conversation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id, &conversation_id))?;

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let (page, has_more) = paginate(messages, query.offset.unwrap_or(0), limit);

    Ok(Json(HistoryResponse { conversation_id, messages: page, has_more }))
}

async fn list_conversations(
    Query(query): Query<ConversationListQuery>,
    State(state): State<ChatState>,
) -> ApiResult<ConversationListResponse> {
    let correlation_id = new_correlation_id();
    let user_id = query.user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string());
    let conversations = state
        .runtime
        .list_conversations(
            &user_id,
            query.limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await
        .map_err(|error| api_error(error, &correlation_id, ""))?;

    let total = conversations.len();
    Ok(Json(ConversationListResponse { conversations, total }))
}

/// `204` when the thread was removed, `404` when it does not exist or belongs to another
/// `user_id`.
async fn delete_conversation(
    Path(conversation_id): Path<String>,
    Query(query): Query<DeleteQuery>,
    State(state): State<ChatState>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let correlation_id = new_correlation_id();
    let deleted = state
        .runtime
        .delete_conversation(&conversation_id, query.user_id.as_deref(), &correlation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id, &conversation_id))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&conversation_id, correlation_id))
    }
}

fn not_found(conversation_id: &str, correlation_id: String) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError { error: format!("conversation `{conversation_id}` not found"), correlation_id }),
    )
}

/// Oldest-first slice of `messages` starting at `offset`.
pub fn paginate<T>(messages: Vec<T>, offset: usize, limit: usize) -> (Vec<T>, bool) {
    let total = messages.len();
    let page = messages.into_iter().skip(offset).take(limit).collect();
    (page, offset.saturating_add(limit) < total)
}

fn api_error(
    error: ApplicationError,
    correlation_id: &str,
    thread_id: &str,
) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    warn!(
        event_name = "server.chat.failed",
        correlation_id = %correlation_id,
        thread_id = %thread_id,
        status = status.as_u16(),
        error = %interface,
        "chat request failed"
    );

    let message = match &interface {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        other => other.user_message().to_string(),
    };
    (status, Json(ApiError { error: message, correlation_id: correlation_id.to_string() }))
}

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}
