//! Tests for the trusted `/internal/*` sync surface driven by the
//! identity provider's webhooks.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

mod common;

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn call(
    app: &axum::Router,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn user_sync_rejects_malformed_email() {
    let (app, _state) = common::create_test_app();

    let (status, json) = call(
        &app,
        post_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": "oauth|someone",
                "email": "not-an-email",
                "name": "Someone",
                "image": "https://img.example.com/someone.png",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "E0002");
}

#[tokio::test]
async fn user_sync_rejects_blank_token_identifier() {
    let (app, _state) = common::create_test_app();

    let (status, _) = call(
        &app,
        post_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": "  ",
                "email": "someone@example.com",
                "name": "Someone",
                "image": "https://img.example.com/someone.png",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    require_database!();
    let (app, _state) = common::create_test_app();

    let token_identifier = format!("oauth|dup_{}", Uuid::new_v4().simple());
    let body = serde_json::json!({
        "token_identifier": token_identifier,
        "email": "dup@example.com",
        "name": "Dup",
        "image": "https://img.example.com/dup.png",
    });

    let (status, _) = call(&app, post_json("/internal/users", body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, post_json("/internal/users", body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "E2002");
}

#[tokio::test]
async fn profile_image_update_round_trips() {
    require_database!();
    let (app, _state) = common::create_test_app();

    let token_identifier = format!("oauth|img_{}", Uuid::new_v4().simple());
    let (status, _) = call(
        &app,
        post_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": token_identifier,
                "email": "img@example.com",
                "name": "Imago",
                "image": "https://img.example.com/old.png",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        patch_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": token_identifier,
                "image": "https://img.example.com/new.png",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = common::create_test_jwt(&token_identifier);
    let (_, json) = call(
        &app,
        Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["data"]["image"], "https://img.example.com/new.png");
}

#[tokio::test]
async fn updates_for_unknown_users_are_not_found() {
    require_database!();
    let (app, _state) = common::create_test_app();

    let (status, json) = call(
        &app,
        patch_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": format!("oauth|ghost_{}", Uuid::new_v4().simple()),
                "image": "https://img.example.com/ghost.png",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "E2001");

    let (status, _) = call(
        &app,
        post_json(
            "/internal/presence",
            serde_json::json!({
                "token_identifier": format!("oauth|ghost_{}", Uuid::new_v4().simple()),
                "is_online": true,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presence_flag_flips_through_the_internal_endpoint() {
    require_database!();
    let (app, _state) = common::create_test_app();

    let token_identifier = format!("oauth|presence_{}", Uuid::new_v4().simple());
    let (status, _) = call(
        &app,
        post_json(
            "/internal/users",
            serde_json::json!({
                "token_identifier": token_identifier,
                "email": "presence@example.com",
                "name": "Presence",
                "image": "https://img.example.com/presence.png",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        post_json(
            "/internal/presence",
            serde_json::json!({ "token_identifier": token_identifier, "is_online": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = common::create_test_jwt(&token_identifier);
    let (_, json) = call(
        &app,
        Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["data"]["is_online"], false);
}
