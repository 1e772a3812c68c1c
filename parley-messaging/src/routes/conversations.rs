use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use parley_shared::errors::{AppError, AppResult, ErrorCode};
use parley_shared::types::api::ApiResponse;
use parley_shared::types::auth::AuthIdentity;

use crate::models::{direct_key, Conversation, NewConversation, NewConversationMember, User};
use crate::routes::emit_to_users;
use crate::schema::{conversation_members, conversations, users};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participants: Vec<Uuid>,
    pub is_group: bool,
    pub name: Option<String>,
    /// Storage key from a prior upload; resolved to a public URL before
    /// persisting.
    pub group_image: Option<String>,
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct KickUserRequest {
    pub user_id: Uuid,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationPreview {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub group_image: Option<String>,
    pub admin_id: Option<Uuid>,
    /// The counterpart's profile, attached for direct conversations only.
    pub other_user: Option<User>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExitConversationResponse {
    pub deleted: bool,
    pub message: String,
}

// --- Helpers ---

fn resolve_caller(
    conn: &mut diesel::pg::PgConnection,
    identity: &AuthIdentity,
) -> AppResult<User> {
    users::table
        .filter(users::token_identifier.eq(&identity.token_identifier))
        .first::<User>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))
}

fn last_message_of(conversation: &Conversation) -> Option<LastMessage> {
    match (
        conversation.last_message_id,
        conversation.last_message_sender_id,
        conversation.last_message_at,
    ) {
        (Some(id), Some(sender_id), Some(created_at)) => Some(LastMessage {
            id,
            content: conversation.last_message_content.clone().unwrap_or_default(),
            sender_id,
            message_type: conversation
                .last_message_type
                .clone()
                .unwrap_or_else(|| "text".to_string()),
            created_at,
        }),
        _ => None,
    }
}

// --- Handlers ---

/// POST /conversations - create a direct or group conversation.
///
/// Direct conversations are deduplicated by their canonical participant
/// pair key: a second create for the same pair (in either order) returns
/// the existing conversation's id. The key's unique index makes this hold
/// even when two creates race: the loser re-reads the winner.
pub async fn create_conversation(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<Json<ApiResponse<CreateConversationResponse>>> {
    let mut participants: Vec<Uuid> = Vec::with_capacity(req.participants.len());
    for id in &req.participants {
        if !participants.contains(id) {
            participants.push(*id);
        }
    }

    if participants.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "participants must not be empty",
        ));
    }

    if !req.is_group && participants.len() != 2 {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "a direct conversation has exactly two distinct participants",
        ));
    }

    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if req.is_group {
        let name = name.ok_or_else(|| {
            AppError::new(ErrorCode::GroupNameRequired, "group name is required")
        })?;
        if name.len() > 100 {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "group name max 100 characters",
            ));
        }
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let caller = resolve_caller(&mut conn, &identity)?;

    if !participants.contains(&caller.id) {
        return Err(AppError::new(
            ErrorCode::Forbidden,
            "conversation creator must be a participant",
        ));
    }

    let known: i64 = users::table
        .filter(users::id.eq_any(&participants))
        .count()
        .get_result(&mut conn)
        .map_err(AppError::Database)?;
    if known != participants.len() as i64 {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "unknown participant id",
        ));
    }

    let admin_id = if req.is_group {
        let admin = req.admin_id.unwrap_or(caller.id);
        if !participants.contains(&admin) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "group admin must be a participant",
            ));
        }
        Some(admin)
    } else {
        None
    };

    let pair_key = if req.is_group {
        None
    } else {
        Some(direct_key(participants[0], participants[1]))
    };

    // Dedup lookup for direct conversations
    if let Some(key) = &pair_key {
        let existing: Option<Uuid> = conversations::table
            .filter(conversations::direct_key.eq(key))
            .select(conversations::id)
            .first::<Uuid>(&mut conn)
            .optional()
            .map_err(AppError::Database)?;

        if let Some(id) = existing {
            return Ok(Json(ApiResponse::ok(CreateConversationResponse { id })));
        }
    }

    let group_image = req.group_image.as_deref().map(|key| state.storage.object_url(key));

    let new_conversation = NewConversation {
        is_group: req.is_group,
        name: name.map(str::to_string),
        group_image,
        admin_id,
        direct_key: pair_key.clone(),
    };

    let inserted = conn.transaction::<Conversation, diesel::result::Error, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .values(&new_conversation)
            .get_result(conn)?;

        let members: Vec<NewConversationMember> = participants
            .iter()
            .map(|user_id| NewConversationMember {
                conversation_id: conversation.id,
                user_id: *user_id,
            })
            .collect();

        diesel::insert_into(conversation_members::table)
            .values(&members)
            .execute(conn)?;

        Ok(conversation)
    });

    let conversation = match (inserted, &pair_key) {
        (Ok(conversation), _) => conversation,
        // A concurrent create for the same pair won the unique index race;
        // return the winner's conversation.
        (
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)),
            Some(key),
        ) => {
            let id: Uuid = conversations::table
                .filter(conversations::direct_key.eq(key))
                .select(conversations::id)
                .first::<Uuid>(&mut conn)
                .map_err(AppError::Database)?;
            return Ok(Json(ApiResponse::ok(CreateConversationResponse { id })));
        }
        (Err(e), _) => return Err(AppError::Database(e)),
    };

    tracing::info!(
        conversation = %conversation.id,
        is_group = conversation.is_group,
        creator = %caller.id,
        "conversation created"
    );

    let payload = serde_json::json!({
        "conversation_id": conversation.id,
        "is_group": conversation.is_group,
        "name": conversation.name,
    });
    emit_to_users(&state.io, &participants, Some(caller.id), "conversation-created", &payload);

    Ok(Json(ApiResponse::ok(CreateConversationResponse {
        id: conversation.id,
    })))
}

/// GET /conversations - the caller's conversations, most recent activity
/// first. Direct conversations carry the other participant's profile;
/// every row carries the denormalized last-message snapshot.
pub async fn list_my_conversations(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ConversationPreview>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    // A session whose user record has not landed yet sees an empty list,
    // not an error.
    let user: Option<User> = users::table
        .filter(users::token_identifier.eq(&identity.token_identifier))
        .first::<User>(&mut conn)
        .optional()
        .map_err(AppError::Database)?;

    let user = match user {
        Some(user) => user,
        None => return Ok(Json(ApiResponse::ok(vec![]))),
    };

    let conversation_ids: Vec<Uuid> = conversation_members::table
        .filter(conversation_members::user_id.eq(user.id))
        .select(conversation_members::conversation_id)
        .load::<Uuid>(&mut conn)
        .map_err(AppError::Database)?;

    if conversation_ids.is_empty() {
        return Ok(Json(ApiResponse::ok(vec![])));
    }

    let my_conversations: Vec<Conversation> = conversations::table
        .filter(conversations::id.eq_any(&conversation_ids))
        .load::<Conversation>(&mut conn)
        .map_err(AppError::Database)?;

    let mut previews = Vec::with_capacity(my_conversations.len());
    for conversation in my_conversations {
        let other_user = if conversation.is_group {
            None
        } else {
            let other_id: Option<Uuid> = conversation_members::table
                .filter(conversation_members::conversation_id.eq(conversation.id))
                .filter(conversation_members::user_id.ne(user.id))
                .select(conversation_members::user_id)
                .first::<Uuid>(&mut conn)
                .optional()
                .map_err(AppError::Database)?;

            match other_id {
                Some(id) => users::table
                    .find(id)
                    .first::<User>(&mut conn)
                    .optional()
                    .map_err(AppError::Database)?,
                None => None,
            }
        };

        let last_message = last_message_of(&conversation);

        previews.push(ConversationPreview {
            id: conversation.id,
            is_group: conversation.is_group,
            name: conversation.name,
            group_image: conversation.group_image,
            admin_id: conversation.admin_id,
            other_user,
            last_message,
            created_at: conversation.created_at,
        });
    }

    // Most recent activity first, falling back to creation time
    previews.sort_by(|a, b| {
        let a_time = a.last_message.as_ref().map(|m| m.created_at).unwrap_or(a.created_at);
        let b_time = b.last_message.as_ref().map(|m| m.created_at).unwrap_or(b.created_at);
        b_time.cmp(&a_time)
    });

    Ok(Json(ApiResponse::ok(previews)))
}

/// POST /conversations/:id/kick - remove a member from a group. Admin
/// only; direct conversations have no kick.
pub async fn kick_user(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<KickUserRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let caller = resolve_caller(&mut conn, &identity)?;

    let conversation: Conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    if !conversation.is_group {
        return Err(AppError::new(
            ErrorCode::NotAGroupConversation,
            "cannot kick from a direct conversation",
        ));
    }

    if conversation.admin_id != Some(caller.id) {
        return Err(AppError::new(
            ErrorCode::NotConversationAdmin,
            "only the group admin can kick members",
        ));
    }

    if req.user_id == caller.id {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "use exit to leave a conversation",
        ));
    }

    let removed = diesel::delete(
        conversation_members::table
            .filter(conversation_members::conversation_id.eq(conversation_id))
            .filter(conversation_members::user_id.eq(req.user_id)),
    )
    .execute(&mut conn)
    .map_err(AppError::Database)?;

    if removed == 0 {
        return Err(AppError::new(
            ErrorCode::NotConversationMember,
            "user is not a member of this conversation",
        ));
    }

    tracing::info!(
        conversation = %conversation_id,
        kicked = %req.user_id,
        by = %caller.id,
        "member kicked"
    );

    let remaining: Vec<Uuid> = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .select(conversation_members::user_id)
        .load::<Uuid>(&mut conn)
        .map_err(AppError::Database)?;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": req.user_id,
    });
    emit_to_users(&state.io, &remaining, Some(caller.id), "conversation-member-left", &payload);
    emit_to_users(
        &state.io,
        &[req.user_id],
        None,
        "conversation-removed",
        &serde_json::json!({ "conversation_id": conversation_id }),
    );

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "conversation_id": conversation_id,
        "kicked": req.user_id,
    }))))
}

/// POST /conversations/:id/exit - leave a conversation. An emptied
/// conversation is deleted (messages cascade with it); a departing group
/// admin hands the role to the lowest remaining user id.
pub async fn exit_conversation(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ExitConversationResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let caller = resolve_caller(&mut conn, &identity)?;

    let conversation: Conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    let (deleted, remaining) = conn.transaction::<(bool, Vec<Uuid>), AppError, _>(|conn| {
        let removed = diesel::delete(
            conversation_members::table
                .filter(conversation_members::conversation_id.eq(conversation_id))
                .filter(conversation_members::user_id.eq(caller.id)),
        )
        .execute(conn)?;

        if removed == 0 {
            return Err(AppError::new(
                ErrorCode::NotConversationMember,
                "you are not a member of this conversation",
            ));
        }

        let remaining: Vec<Uuid> = conversation_members::table
            .filter(conversation_members::conversation_id.eq(conversation_id))
            .select(conversation_members::user_id)
            .order(conversation_members::user_id.asc())
            .load::<Uuid>(conn)?;

        if remaining.is_empty() {
            diesel::delete(conversations::table.find(conversation_id)).execute(conn)?;
            return Ok((true, remaining));
        }

        if conversation.is_group && conversation.admin_id == Some(caller.id) {
            diesel::update(conversations::table.find(conversation_id))
                .set(conversations::admin_id.eq(remaining[0]))
                .execute(conn)?;
        }

        Ok((false, remaining))
    })?;

    tracing::info!(
        conversation = %conversation_id,
        user = %caller.id,
        deleted = deleted,
        "member exited"
    );

    if deleted {
        return Ok(Json(ApiResponse::ok(ExitConversationResponse {
            deleted: true,
            message: "conversation deleted as no participants remain".to_string(),
        })));
    }

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": caller.id,
    });
    emit_to_users(&state.io, &remaining, None, "conversation-member-left", &payload);

    Ok(Json(ApiResponse::ok(ExitConversationResponse {
        deleted: false,
        message: "you have exited the conversation".to_string(),
    })))
}
