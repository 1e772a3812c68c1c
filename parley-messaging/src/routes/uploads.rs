use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use parley_shared::errors::{AppError, AppResult, ErrorCode};
use parley_shared::types::api::ApiResponse;
use parley_shared::types::auth::AuthIdentity;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub key: String,
}

/// POST /uploads - mint a short-lived presigned PUT target.
///
/// Uploading is a two-step protocol: the client PUTs bytes to the
/// returned URL, then references `key` in a subsequent image/video send
/// or group-image field. An upload no message ever references is just an
/// orphaned object.
pub async fn generate_upload_url(
    _identity: AuthIdentity,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UploadUrlResponse>>> {
    let key = format!("uploads/{}", Uuid::now_v7());

    let upload_url = state
        .storage
        .presigned_upload_url(&key, state.config.upload_url_ttl_secs)
        .await
        .map_err(|e| AppError::new(ErrorCode::StorageError, e))?;

    Ok(Json(ApiResponse::ok(UploadUrlResponse { upload_url, key })))
}
