use socketioxide::SocketIo;
use uuid::Uuid;

pub mod conversations;
pub mod health;
pub mod internal;
pub mod messages;
pub mod uploads;
pub mod users;

/// Emit an event to each listed user's room, optionally skipping one
/// (usually the caller, who already has the REST response in hand).
/// Delivery is best-effort; REST responses remain the source of truth.
pub(crate) fn emit_to_users(
    io: &SocketIo,
    user_ids: &[Uuid],
    skip: Option<Uuid>,
    event: &str,
    payload: &serde_json::Value,
) {
    for user_id in user_ids {
        if Some(*user_id) == skip {
            continue;
        }
        let room = format!("user:{user_id}");
        if let Err(e) = io.to(room).emit(event, payload) {
            tracing::debug!(error = %e, target_user = %user_id, event = event, "socket emit failed");
        }
    }
}
