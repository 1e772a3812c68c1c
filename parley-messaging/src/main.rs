use std::sync::Arc;

use parley_messaging::config::AppConfig;
use parley_messaging::presence::PresenceRegistry;
use parley_messaging::{create_router, socket, AppState};
use parley_shared::clients::minio::MinioClient;
use socketioxide::SocketIo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley_shared::middleware::init_tracing("parley-messaging");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = parley_shared::clients::db::create_pool(&config.database_url);

    let storage = MinioClient::new(
        &config.minio_endpoint,
        &config.minio_access_key,
        &config.minio_secret_key,
        &config.minio_bucket,
        &config.minio_public_url,
    );
    storage.ensure_bucket().await;

    let metrics_handle = parley_shared::middleware::init_metrics();

    // Build Socket.IO layer - io lives in AppState so REST routes can emit
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let state = Arc::new(AppState {
        db,
        config,
        storage,
        io: io.clone(),
        presence: PresenceRegistry::new(),
        metrics_handle,
    });

    // Configure the Socket.IO namespace with state via closure
    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    let app = create_router(state).layer(sio_layer);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "parley-messaging starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
