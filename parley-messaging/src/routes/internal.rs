//! Identity-provider sync surface (trusted network, no end-user auth).
//!
//! The provider's webhooks drive user creation, profile-image updates,
//! and session-lifecycle presence; deployments keep `/internal/*` off the
//! public edge, same as any service-to-service route.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use parley_shared::errors::{AppError, AppResult, ErrorCode};
use parley_shared::types::api::ApiResponse;

use crate::models::NewUser;
use crate::schema::users;
use crate::AppState;

// --- Request/Response DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    pub token_identifier: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub token_identifier: String,
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePresenceRequest {
    pub token_identifier: String,
    pub is_online: bool,
}

// --- Handlers ---

/// POST /internal/users - register a user on first successful sign-in.
/// New users start online: the webhook fires mid-session.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<CreateUserResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    if req.token_identifier.trim().is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "token_identifier must not be empty",
        ));
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let new_user = NewUser {
        token_identifier: req.token_identifier,
        email: req.email,
        name: req.name,
        image: req.image,
        is_online: true,
    };

    let user_id: Uuid = diesel::insert_into(users::table)
        .values(&new_user)
        .returning(users::id)
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::new(ErrorCode::UserAlreadyExists, "token identifier already registered")
            }
            other => AppError::Database(other),
        })?;

    tracing::info!(user_id = %user_id, "user registered");

    Ok(Json(ApiResponse::ok(CreateUserResponse { id: user_id })))
}

/// PATCH /internal/users - update the profile image for a user.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let updated_rows = diesel::update(
        users::table.filter(users::token_identifier.eq(&req.token_identifier)),
    )
    .set((users::image.eq(&req.image), users::updated_at.eq(Utc::now())))
    .execute(&mut conn)
    .map_err(AppError::Database)?;

    if updated_rows == 0 {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    Ok(Json(ApiResponse::ok(serde_json::json!({ "updated": true }))))
}

/// POST /internal/presence - provider-driven online/offline flip.
pub async fn update_presence(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdatePresenceRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let user_id: Uuid = diesel::update(
        users::table.filter(users::token_identifier.eq(&req.token_identifier)),
    )
    .set((
        users::is_online.eq(req.is_online),
        users::updated_at.eq(Utc::now()),
    ))
    .returning(users::id)
    .get_result(&mut conn)
    .optional()
    .map_err(AppError::Database)?
    .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let event = if req.is_online { "user-online" } else { "user-offline" };
    let payload = serde_json::json!({ "user_id": user_id });
    if let Err(e) = state.io.emit(event, &payload) {
        tracing::debug!(error = %e, event = event, "presence broadcast failed");
    }

    tracing::debug!(user_id = %user_id, is_online = req.is_online, "presence updated");

    Ok(Json(ApiResponse::ok(serde_json::json!({ "updated": true }))))
}
