//! Input-validation tests. Validation runs before any database access,
//! so these pass without a live database.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

mod common;

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_conversation_rejects_empty_participants() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let response = app
        .oneshot(post_json(
            "/conversations",
            &token,
            serde_json::json!({ "participants": [], "is_group": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn direct_conversation_requires_exactly_two_participants() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let response = app
        .oneshot(post_json(
            "/conversations",
            &token,
            serde_json::json!({
                "participants": [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
                "is_group": false,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicated_pair_collapses_to_one_participant() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");
    let user = Uuid::new_v4();

    // The same id twice is one distinct participant, not two.
    let response = app
        .oneshot(post_json(
            "/conversations",
            &token,
            serde_json::json!({ "participants": [user, user], "is_group": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn group_conversation_requires_a_name() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    for name in [serde_json::Value::Null, serde_json::json!("   ")] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/conversations",
                &token,
                serde_json::json!({
                    "participants": [Uuid::new_v4(), Uuid::new_v4()],
                    "is_group": true,
                    "name": name,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn group_name_is_length_capped() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let response = app
        .oneshot(post_json(
            "/conversations",
            &token,
            serde_json::json!({
                "participants": [Uuid::new_v4(), Uuid::new_v4()],
                "is_group": true,
                "name": "x".repeat(101),
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn text_message_must_have_content() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let uri = format!("/conversations/{}/messages", Uuid::new_v4());
    let response = app
        .oneshot(post_json(
            &uri,
            &token,
            serde_json::json!({ "sender": Uuid::new_v4(), "content": "   " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_message_must_have_storage_key() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    for kind in ["image", "video"] {
        let uri = format!("/conversations/{}/messages/{kind}", Uuid::new_v4());
        let response = app
            .clone()
            .oneshot(post_json(
                &uri,
                &token,
                serde_json::json!({ "sender": Uuid::new_v4(), "storage_key": "" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "kind: {kind}");
    }
}

#[tokio::test]
async fn non_uuid_conversation_path_is_rejected() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/conversations/not-a-uuid/messages")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_url_is_minted_for_authenticated_callers() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_jwt("oauth|validation_user");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uploads")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let key = json["data"]["key"].as_str().unwrap();
    let upload_url = json["data"]["upload_url"].as_str().unwrap();
    assert!(key.starts_with("uploads/"));
    assert!(upload_url.contains(key));
}
