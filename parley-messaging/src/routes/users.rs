use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use parley_shared::errors::{AppError, AppResult, ErrorCode};
use parley_shared::types::api::ApiResponse;
use parley_shared::types::auth::AuthIdentity;

use crate::models::{Conversation, User};
use crate::schema::{conversation_members, conversations, users};
use crate::AppState;

/// GET /users - every registered user. The conversation composer offers
/// the full directory; there is no pagination at this scale.
pub async fn list_users(
    _identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let all_users: Vec<User> = users::table
        .order(users::name.asc())
        .load::<User>(&mut conn)
        .map_err(AppError::Database)?;

    Ok(Json(ApiResponse::ok(all_users)))
}

/// GET /me - the caller's own user record.
pub async fn get_me(
    identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let me: User = users::table
        .filter(users::token_identifier.eq(&identity.token_identifier))
        .first::<User>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    Ok(Json(ApiResponse::ok(me)))
}

/// GET /conversations/:id/members - resolve every member to a user
/// record. Members whose user row has gone missing are dropped, not
/// surfaced as an error.
pub async fn get_group_members(
    _identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let _conversation: Conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    let members: Vec<User> = conversation_members::table
        .inner_join(users::table)
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .order(conversation_members::joined_at.asc())
        .select(users::all_columns)
        .load::<User>(&mut conn)
        .map_err(AppError::Database)?;

    Ok(Json(ApiResponse::ok(members)))
}
