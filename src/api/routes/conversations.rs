//! Conversation Routes
//!
//! REST access to conversations for clients that are not (yet) holding a
//! WebSocket open. Messages posted here reach live participants through the
//! hub exactly like messages sent over a socket.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{CreateConversationRequest, MessagesQuery, SendMessageRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::AuthUser;
use crate::api::state::AppState;
use crate::auth::UserIdentity;
use crate::types::{ConversationId, ConversationSummary, MessageId, MessageProjection};
use crate::websocket::OutboundEvent;

/// GET /api/v1/conversations
///
/// Conversations the caller participates in, newest first.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = state.store.list_conversations(user.id).await?;
    Ok(Json(conversations))
}

/// POST /api/v1/conversations
///
/// Create a conversation owned by the caller.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationSummary>)> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let conversation = state
        .store
        .create_conversation(user.id, &req.participant_ids, title)
        .await?;

    tracing::info!(
        conversation_id = %conversation.id,
        owner_id = %user.id,
        participants = conversation.participants.len(),
        "Conversation created"
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/v1/conversations/:id/messages
///
/// Latest messages, oldest first.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<MessageProjection>>> {
    let conversation = ConversationId(id);
    ensure_participant(&state, conversation, &user).await?;

    let limit = query
        .limit
        .unwrap_or(state.config.history_limit)
        .clamp(1, state.config.max_history_limit);

    let messages = state.store.list_messages(conversation, limit).await?;
    Ok(Json(messages))
}

/// POST /api/v1/conversations/:id/messages
///
/// Persist a message and fan it out to live participants.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageProjection>)> {
    let conversation = ConversationId(id);
    ensure_participant(&state, conversation, &user).await?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("content must not be blank".to_string()));
    }

    let message = state
        .store
        .persist_message(conversation, user.id, content)
        .await?;

    let delivered = state.hub.broadcast(
        conversation,
        &OutboundEvent::Message {
            data: message.clone(),
        },
    );

    tracing::debug!(
        conversation_id = %conversation,
        user_id = %user.id,
        message_id = %message.id,
        delivered,
        "Message posted over HTTP"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/conversations/:id/read/:message_id
///
/// Record a read receipt. The first receipt for a message wins.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((id, message_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let conversation = ConversationId(id);
    ensure_participant(&state, conversation, &user).await?;

    state
        .store
        .upsert_receipt(conversation, MessageId(message_id), user.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Non-participants see 404 so conversation ids cannot be probed
async fn ensure_participant(
    state: &AppState,
    conversation: ConversationId,
    user: &UserIdentity,
) -> ApiResult<()> {
    if state.store.is_participant(conversation, user.id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("Conversation {}", conversation)))
    }
}
