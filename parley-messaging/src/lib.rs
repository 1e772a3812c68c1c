use axum::routing::{get, post};
use axum::Router;
use socketioxide::SocketIo;
use std::sync::Arc;

use parley_shared::clients::db::DbPool;
use parley_shared::clients::minio::MinioClient;
use parley_shared::middleware::metrics_middleware;

pub mod config;
pub mod models;
pub mod presence;
pub mod routes;
pub mod schema;
pub mod socket;

use config::AppConfig;
use presence::PresenceRegistry;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub storage: MinioClient,
    pub io: SocketIo,
    pub presence: PresenceRegistry,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        // Health + metrics
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Identity-provider sync (trusted network, not exposed publicly)
        .route(
            "/internal/users",
            post(routes::internal::create_user).patch(routes::internal::update_user),
        )
        .route("/internal/presence", post(routes::internal::update_presence))
        // Users
        .route("/users", get(routes::users::list_users))
        .route("/me", get(routes::users::get_me))
        // Conversations
        .route(
            "/conversations",
            post(routes::conversations::create_conversation)
                .get(routes::conversations::list_my_conversations),
        )
        .route(
            "/conversations/:id/members",
            get(routes::users::get_group_members),
        )
        .route("/conversations/:id/kick", post(routes::conversations::kick_user))
        .route("/conversations/:id/exit", post(routes::conversations::exit_conversation))
        // Messages
        .route(
            "/conversations/:id/messages",
            get(routes::messages::list_messages).post(routes::messages::send_text_message),
        )
        .route(
            "/conversations/:id/messages/image",
            post(routes::messages::send_image),
        )
        .route(
            "/conversations/:id/messages/video",
            post(routes::messages::send_video),
        )
        // Uploads
        .route("/uploads", post(routes::uploads::generate_upload_url))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
