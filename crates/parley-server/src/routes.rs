//! HTTP handlers for the conversation and identity surfaces.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use parley_chat::DEFAULT_CONVERSATION_NAME;
use parley_chat::DirectoryView;
use parley_core::errors::ChatError;
use parley_core::ids::ConversationId;
use parley_core::messages::Message;
use parley_identity::IdentityEvent;
use parley_store::Conversation;

use crate::auth::AuthedUser;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameChatRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub prompt: String,
}

#[derive(Serialize)]
pub struct DeleteChatResponse {
    pub deleted: bool,
}

#[derive(Serialize)]
pub struct ProcessedResponse {
    pub processed: bool,
}

/// POST /chats
pub async fn create_chat(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let name = req.name.as_deref().unwrap_or(DEFAULT_CONVERSATION_NAME);
    let conversation = state.conversations.create(&user.owner, name)?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /chats
pub async fn list_chats(
    State(state): State<AppState>,
    user: AuthedUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state.conversations.list(&user.owner)?;
    Ok(Json(conversations))
}

/// GET /session — list with first-conversation bootstrap and default
/// selection.
pub async fn open_session(
    State(state): State<AppState>,
    user: AuthedUser,
) -> Result<Json<DirectoryView>, ApiError> {
    let view = state.directory.open(&user.owner)?;
    Ok(Json(view))
}

/// PATCH /chats/{id}
pub async fn rename_chat(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<String>,
    Json(req): Json<RenameChatRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let id = ConversationId::parse(&id).map_err(ChatError::from)?;
    let conversation = state.conversations.rename(&user.owner, &id, &req.name)?;
    Ok(Json(conversation))
}

/// DELETE /chats/{id}
pub async fn delete_chat(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteChatResponse>, ApiError> {
    let id = ConversationId::parse(&id).map_err(ChatError::from)?;
    state.conversations.delete(&user.owner, &id)?;
    Ok(Json(DeleteChatResponse { deleted: true }))
}

/// POST /chats/{id}/messages — run one turn and return the assistant
/// message.
///
/// The turn runs in a spawned task: a client that disconnects mid-request
/// does not cancel the generation call, and a completed turn is persisted
/// regardless.
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let turns = Arc::clone(&state.turns);
    let task = tokio::spawn(async move { turns.run(&user.owner, &id, &req.prompt).await });

    let reply = task
        .await
        .map_err(|e| ChatError::PersistenceFailed(format!("turn task failed: {e}")))??;
    Ok(Json(reply))
}

/// POST /identity-events — webhook ingress. The raw body is verified
/// before it is parsed; an unverifiable delivery mutates nothing.
pub async fn identity_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProcessedResponse>, ApiError> {
    let message_id = require_header(&headers, "webhook-id")?;
    let timestamp = require_header(&headers, "webhook-timestamp")?;
    let signature = require_header(&headers, "webhook-signature")?;

    state
        .webhook_verifier
        .verify(message_id, timestamp, signature, &body)?;

    let event = IdentityEvent::parse(&body)?;
    state.identity.apply(&event)?;

    Ok(Json(ProcessedResponse { processed: true }))
}

fn require_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ChatError::Authenticity(format!("missing {name} header")).into())
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
            },
        })),
    )
}
