use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use jsonwebtoken::{encode, EncodingKey, Header};
use metrics_exporter_prometheus::PrometheusHandle;
use socketioxide::SocketIo;

use parley_messaging::config::AppConfig;
use parley_messaging::presence::PresenceRegistry;
use parley_messaging::{create_router, AppState};
use parley_shared::clients::minio::MinioClient;
use parley_shared::types::auth::Claims;

/// Secret matching the extractor's development fallback.
pub const TEST_JWT_SECRET: &str = "development-secret-change-in-production";

/// Check if a test database is available via environment variable.
#[allow(dead_code)]
pub fn database_available() -> bool {
    std::env::var("PARLEY_TEST_DATABASE_URL").is_ok()
}

/// Skip test with a message if no test database is configured.
#[macro_export]
macro_rules! require_database {
    () => {
        if !crate::common::database_available() {
            eprintln!("skipping: PARLEY_TEST_DATABASE_URL not set");
            return;
        }
    };
}

fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(parley_shared::middleware::init_metrics)
        .clone()
}

/// Create a test app. Without `PARLEY_TEST_DATABASE_URL` the pool is
/// lazy and unconnected: routes that reject before touching the
/// database (auth, validation, presigning) still work end to end.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let mut config = AppConfig::load().expect("failed to build test config");
    if let Ok(url) = std::env::var("PARLEY_TEST_DATABASE_URL") {
        config.database_url = url;
    }

    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let db = Pool::builder()
        .max_size(2)
        .connection_timeout(Duration::from_millis(500))
        .build_unchecked(manager);

    let storage = MinioClient::new(
        &config.minio_endpoint,
        &config.minio_access_key,
        &config.minio_secret_key,
        &config.minio_bucket,
        &config.minio_public_url,
    );

    let (_sio_layer, io) = SocketIo::builder().build_layer();
    io.ns("/", |_socket: socketioxide::extract::SocketRef| async move {});

    let state = Arc::new(AppState {
        db,
        config,
        storage,
        io,
        presence: PresenceRegistry::new(),
        metrics_handle: metrics_handle(),
    });

    (create_router(state.clone()), state)
}

/// Mint a signed session token for the given identity-provider subject.
#[allow(dead_code)]
pub fn create_test_jwt(token_identifier: &str) -> String {
    let claims = Claims::new(token_identifier, 3600);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("failed to sign test token")
}

/// Mint a token that expired an hour ago.
#[allow(dead_code)]
pub fn create_expired_jwt(token_identifier: &str) -> String {
    let mut claims = Claims::new(token_identifier, 3600);
    claims.iat -= 7200;
    claims.exp -= 7200;
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("failed to sign test token")
}
