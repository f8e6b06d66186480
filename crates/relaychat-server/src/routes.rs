use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use relaychat_provider::{ProviderError, RelayOutcome, MISSING_KEY_BODY, UPSTREAM_ERROR_BODY};
use relaychat_session::SessionError;
use relaychat_storage::MessageStore;
use relaychat_types::{Conversation, Message, MessageRole};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::server::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(relay_chat))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            patch(rename_conversation).delete(delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(append_message),
        )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Passthrough relay. Errors here are plain text, never the JSON envelope.
async fn relay_chat(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match state.gateway.relay(body).await {
        Ok(RelayOutcome::Stream(stream)) => (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(stream),
        )
            .into_response(),
        Ok(RelayOutcome::Failure { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body).into_response()
        }
        Err(ProviderError::Configuration(_)) => {
            tracing::error!("relay called without an upstream credential");
            (StatusCode::INTERNAL_SERVER_ERROR, MISSING_KEY_BODY).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "relay failed");
            (StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_ERROR_BODY).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListConversationsQuery {
    user_id: Option<String>,
}

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<Conversation>>> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    Ok(Json(state.loader.list(&user_id).await?))
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    user_id: String,
    title: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>)> {
    let conversation = match req.title.as_deref() {
        Some(title) => state.loader.create(&req.user_id, title).await?,
        None => state.loader.create_default(&req.user_id).await?,
    };
    Ok((StatusCode::CREATED, Json(conversation)))
}

#[derive(Debug, Deserialize)]
struct RenameConversationRequest {
    title: String,
}

async fn rename_conversation(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<Json<Conversation>> {
    Ok(Json(state.loader.rename(&id, &req.title).await?))
}

async fn delete_conversation(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ensure_conversation(&state, &id).await?;
    state.loader.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    ensure_conversation(&state, &id).await?;
    Ok(Json(state.loader.load_messages(&id).await?))
}

#[derive(Debug, Deserialize)]
struct AppendMessageRequest {
    role: MessageRole,
    content: String,
}

async fn append_message(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    ensure_conversation(&state, &id).await?;
    let message = state
        .loader
        .message_store()
        .insert(&id, req.role, &req.content)
        .await
        .map_err(SessionError::from)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn ensure_conversation(state: &ServerState, id: &str) -> Result<()> {
    match state.loader.get(id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::ConversationNotFound(id.to_string())),
    }
}
