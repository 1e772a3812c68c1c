use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use parley_shared::errors::{AppError, AppResult, ErrorCode};
use parley_shared::types::api::ApiResponse;
use parley_shared::types::auth::AuthIdentity;

use crate::models::{Conversation, Message, MessageType, NewMessage, User};
use crate::routes::emit_to_users;
use crate::schema::{conversation_members, conversations, messages, users};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct SendTextMessageRequest {
    pub sender: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMediaMessageRequest {
    pub sender: Uuid,
    /// Storage key returned by the upload-URL mint.
    pub storage_key: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageWithSender {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: User,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

// --- Helpers ---

/// One authorization gate for every send path: the caller must resolve to
/// a user record, be the declared sender, and be a participant of the
/// conversation. Text, image, and video sends all go through here.
fn authorize_sender(
    conn: &mut diesel::pg::PgConnection,
    identity: &AuthIdentity,
    declared_sender: Uuid,
    conversation_id: Uuid,
) -> AppResult<(User, Conversation)> {
    let user: User = users::table
        .filter(users::token_identifier.eq(&identity.token_identifier))
        .first::<User>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    if user.id != declared_sender {
        return Err(AppError::new(
            ErrorCode::SenderMismatch,
            "declared sender does not match the authenticated caller",
        ));
    }

    let conversation: Conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    let is_member: bool = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.eq(user.id))
        .select(count_star())
        .first::<i64>(conn)
        .map(|c| c > 0)
        .map_err(AppError::Database)?;

    if !is_member {
        return Err(AppError::new(
            ErrorCode::NotConversationMember,
            "sender is not a participant of this conversation",
        ));
    }

    Ok((user, conversation))
}

/// Insert a message and overwrite the conversation's last-message
/// snapshot in one transaction, so the snapshot always matches the
/// newest message.
fn insert_message_with_snapshot(
    conn: &mut diesel::pg::PgConnection,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    kind: MessageType,
) -> Result<Message, diesel::result::Error> {
    conn.transaction(|conn| {
        let message: Message = diesel::insert_into(messages::table)
            .values(&NewMessage {
                conversation_id,
                sender_id,
                content,
                message_type: kind.as_str().to_string(),
            })
            .get_result(conn)?;

        diesel::update(conversations::table.find(conversation_id))
            .set((
                conversations::last_message_id.eq(message.id),
                conversations::last_message_content.eq(&message.content),
                conversations::last_message_sender_id.eq(message.sender_id),
                conversations::last_message_type.eq(&message.message_type),
                conversations::last_message_at.eq(message.created_at),
            ))
            .execute(conn)?;

        Ok(message)
    })
}

fn message_event_payload(conversation: &Conversation, message: &Message) -> serde_json::Value {
    serde_json::json!({
        "conversation_id": message.conversation_id,
        "is_group": conversation.is_group,
        "name": conversation.name,
        "message": {
            "id": message.id,
            "conversation_id": message.conversation_id,
            "sender_id": message.sender_id,
            "content": message.content,
            "message_type": message.message_type,
            "created_at": message.created_at,
        }
    })
}

fn fan_out_message(
    conn: &mut diesel::pg::PgConnection,
    state: &AppState,
    conversation: &Conversation,
    message: &Message,
) {
    let member_ids: Vec<Uuid> = conversation_members::table
        .filter(conversation_members::conversation_id.eq(message.conversation_id))
        .select(conversation_members::user_id)
        .load::<Uuid>(conn)
        .unwrap_or_default();

    let payload = message_event_payload(conversation, message);
    emit_to_users(
        &state.io,
        &member_ids,
        Some(message.sender_id),
        "new-message",
        &payload,
    );
}

// --- Handlers ---

/// POST /conversations/:id/messages - send a text message.
pub async fn send_text_message(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendTextMessageRequest>,
) -> AppResult<Json<ApiResponse<SendMessageResponse>>> {
    if req.content.trim().is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "message content must not be empty",
        ));
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let (sender, conversation) =
        authorize_sender(&mut conn, &identity, req.sender, conversation_id)?;

    let message = insert_message_with_snapshot(
        &mut conn,
        conversation_id,
        sender.id,
        req.content,
        MessageType::Text,
    )
    .map_err(AppError::Database)?;

    tracing::info!(
        sender = %sender.id,
        conversation = %conversation_id,
        "text message sent"
    );

    fan_out_message(&mut conn, &state, &conversation, &message);

    Ok(Json(ApiResponse::ok(SendMessageResponse { id: message.id })))
}

async fn send_media_message(
    identity: AuthIdentity,
    state: Arc<AppState>,
    conversation_id: Uuid,
    req: SendMediaMessageRequest,
    kind: MessageType,
) -> AppResult<Json<ApiResponse<SendMessageResponse>>> {
    if req.storage_key.trim().is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "storage_key must not be empty",
        ));
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let (sender, conversation) =
        authorize_sender(&mut conn, &identity, req.sender, conversation_id)?;

    // The message content is the servable URL of the uploaded object.
    let content = state.storage.object_url(req.storage_key.trim());

    let message =
        insert_message_with_snapshot(&mut conn, conversation_id, sender.id, content, kind)
            .map_err(AppError::Database)?;

    tracing::info!(
        sender = %sender.id,
        conversation = %conversation_id,
        media = %kind,
        "media message sent"
    );

    fan_out_message(&mut conn, &state, &conversation, &message);

    Ok(Json(ApiResponse::ok(SendMessageResponse { id: message.id })))
}

/// POST /conversations/:id/messages/image - send an uploaded image.
pub async fn send_image(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMediaMessageRequest>,
) -> AppResult<Json<ApiResponse<SendMessageResponse>>> {
    send_media_message(identity, state, conversation_id, req, MessageType::Image).await
}

/// POST /conversations/:id/messages/video - send an uploaded video.
pub async fn send_video(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMediaMessageRequest>,
) -> AppResult<Json<ApiResponse<SendMessageResponse>>> {
    send_media_message(identity, state, conversation_id, req, MessageType::Video).await
}

/// GET /conversations/:id/messages - all messages in insertion order,
/// each with a fully resolved sender profile. Repeated senders are
/// resolved once per call.
pub async fn list_messages(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<MessageWithSender>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let caller: User = users::table
        .filter(users::token_identifier.eq(&identity.token_identifier))
        .first::<User>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let _conversation: Conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    let is_member: bool = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.eq(caller.id))
        .select(count_star())
        .first::<i64>(&mut conn)
        .map(|c| c > 0)
        .map_err(AppError::Database)?;

    if !is_member {
        return Err(AppError::new(
            ErrorCode::NotConversationMember,
            "you are not a member of this conversation",
        ));
    }

    let items: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .order(messages::created_at.asc())
        .load::<Message>(&mut conn)
        .map_err(AppError::Database)?;

    let mut sender_cache: HashMap<Uuid, User> = HashMap::new();
    let mut resolved = Vec::with_capacity(items.len());

    for message in items {
        if !sender_cache.contains_key(&message.sender_id) {
            let sender: User = users::table
                .find(message.sender_id)
                .first::<User>(&mut conn)
                .optional()
                .map_err(AppError::Database)?
                .ok_or_else(|| {
                    AppError::new(ErrorCode::SenderNotFound, "sender not found")
                })?;
            sender_cache.insert(message.sender_id, sender);
        }

        let sender = sender_cache[&message.sender_id].clone();
        resolved.push(MessageWithSender {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            content: message.content,
            message_type: message.message_type,
            created_at: message.created_at,
        });
    }

    Ok(Json(ApiResponse::ok(resolved)))
}
