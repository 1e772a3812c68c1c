use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;
use socketioxide::extract::SocketRef;
use uuid::Uuid;

use crate::models::User;
use crate::schema::users;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let token_identifier = match authenticate_socket(&socket, &state) {
        Ok(sub) => sub,
        Err(msg) => {
            tracing::warn!(error = %msg, "socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    // A valid token whose user record has not been synced yet cannot join.
    let user = match resolve_user(&state, &token_identifier) {
        Ok(Some(user)) => user,
        Ok(None) => {
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "USER_NOT_FOUND".into(),
                    message: "no user record for this session".into(),
                },
            );
            socket.disconnect().ok();
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "user lookup failed during socket connect");
            socket.disconnect().ok();
            return;
        }
    };

    // Store user_id in socket extensions
    socket.extensions.insert(user.id);

    // Join user-specific room so mutations can push to this user
    let user_room = format!("user:{}", user.id);
    socket.join(user_room).ok();

    tracing::info!(user_id = %user.id, sid = %socket.id, "socket connected");

    if state.presence.connect(user.id, socket.id) {
        set_online(&state, user.id, true);
        let _ = socket
            .broadcast()
            .emit("user-online", &serde_json::json!({ "user_id": user.id }));
    }

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user.id }));

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state).await;
            }
        }
    });
}

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket disconnected");

    if state.presence.disconnect(user_id, socket.id) {
        set_online(&state, user_id, false);
        let _ = socket
            .broadcast()
            .emit("user-offline", &serde_json::json!({ "user_id": user_id }));
    }
}

fn resolve_user(state: &Arc<AppState>, token_identifier: &str) -> anyhow::Result<Option<User>> {
    let mut conn = state.db.get()?;
    let user = users::table
        .filter(users::token_identifier.eq(token_identifier))
        .first::<User>(&mut conn)
        .optional()?;
    Ok(user)
}

/// Write the presence transition through to the profile record.
fn set_online(state: &Arc<AppState>, user_id: Uuid, is_online: bool) {
    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "failed to get db connection for presence update");
            return;
        }
    };

    if let Err(e) = diesel::update(users::table.find(user_id))
        .set((users::is_online.eq(is_online), users::updated_at.eq(Utc::now())))
        .execute(&mut conn)
    {
        tracing::error!(error = %e, user_id = %user_id, "failed to update presence");
    } else {
        tracing::debug!(user_id = %user_id, is_online = is_online, "presence updated");
    }
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<String, String> {
    let connect_info = socket.req_parts();

    // Extract token from query string ?token=xxx
    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" {
                Some(value.to_string())
            } else {
                None
            }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    // Validate JWT
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<parley_shared::types::auth::Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    if token_data.claims.is_expired() {
        return Err("token has expired".into());
    }

    Ok(token_data.claims.sub)
}
