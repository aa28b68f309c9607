//! Integration tests for the HTTP surface
//!
//! Tests cover:
//! - Authentication (login, refresh, profile, middleware, WebSocket gate)
//! - Request validation on the analyze endpoints
//! - Ownership scoping of sessions, detections and tasks
//! - Session management endpoints
//! - Health endpoint (no auth required)

mod helpers;

use axum::http::StatusCode;
use helpers::{create_test_app, task_id, TEST_PASSWORD, TEST_SECRET};
use serde_json::json;
use vigil_common::api::{issue_token, verify_token, TokenClaims, TokenKind};

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = create_test_app().await;

    let (status, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "vigil");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_login_refresh_and_profile() {
    let app = create_test_app().await;
    let user_id = app.create_user("alice").await;

    let (status, tokens) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": TEST_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = tokens["access"].as_str().unwrap().to_string();
    let refresh = tokens["refresh"].as_str().unwrap().to_string();

    let (status, profile) = app.send("GET", "/auth/user", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], user_id);
    assert_eq!(profile["username"], "alice");
    assert_eq!(profile["email"], "alice@example.com");
    assert!(profile.get("password_hash").is_none());

    let (status, refreshed) = app
        .send("POST", "/auth/refresh", None, Some(json!({"refresh": refresh})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = refreshed["access"].as_str().unwrap();

    let (status, _) = app.send("GET", "/auth/user", Some(new_access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let app = create_test_app().await;
    app.create_user("alice").await;

    let (status, body) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": "nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "mallory", "password": TEST_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = create_test_app().await;
    app.create_user("alice").await;

    let (_, tokens) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": TEST_PASSWORD})),
        )
        .await;
    let refresh = tokens["refresh"].as_str().unwrap();
    let access = tokens["access"].as_str().unwrap();

    let (status, _) = app.send("GET", "/auth/user", Some(refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("POST", "/auth/refresh", None, Some(json!({"refresh": access})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = create_test_app().await;

    for (method, uri) in [
        ("GET", "/auth/user"),
        ("POST", "/analyze/text"),
        ("GET", "/results"),
        ("GET", "/sessions"),
        ("GET", "/detections"),
        ("GET", "/dashboard"),
    ] {
        let (status, body) = app.send(method, uri, None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    let (status, _) = app
        .send("GET", "/dashboard", Some("garbage.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_issues_hs256_jwts() {
    let app = create_test_app().await;
    let user_id = app.create_user("alice").await;

    let (_, tokens) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": TEST_PASSWORD})),
        )
        .await;
    let access = tokens["access"].as_str().unwrap();

    let header = jsonwebtoken::decode_header(access).unwrap();
    assert_eq!(header.alg, jsonwebtoken::Algorithm::HS256);

    let claims = verify_token(access, TEST_SECRET, TokenKind::Access).unwrap();
    assert_eq!(claims.sub, user_id);
    assert!(!claims.jti.is_empty());
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_rejected() {
    let app = create_test_app().await;
    let user_id = app.create_user("alice").await;

    let forged = issue_token(
        &TokenClaims::new(user_id, TokenKind::Access, chrono::Duration::minutes(5)),
        "some-other-key",
    )
    .unwrap();

    let (status, body) = app.send("GET", "/auth/user", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_for_deleted_user_is_rejected() {
    let app = create_test_app().await;
    let token = app.token_for(999);

    let (status, _) = app.send("GET", "/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_websocket_rejects_unauthenticated_before_upgrade() {
    let app = create_test_app().await;

    let (status, _) = app.send("GET", "/ws/notifications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("GET", "/ws/notifications?token=not-a-token", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.hub.topic_count(), 0);
}

// =============================================================================
// Analyze validation
// =============================================================================

#[tokio::test]
async fn test_analyze_requires_payload_fields() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    for (uri, field) in [
        ("/analyze/text", "text"),
        ("/analyze/visual", "image"),
        ("/analyze/audio", "audio"),
    ] {
        let (status, body) = app.send("POST", uri, Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains(field));
    }

    let (status, _) = app
        .send(
            "POST",
            "/analyze/multimodal",
            Some(&token),
            Some(json!({"transcription": "only a hint"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    let (status, body) = app
        .send(
            "POST",
            "/analyze/text",
            Some(&token),
            Some(json!({"text": 42})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_submit_returns_processing_handle() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    let (status, body) = app
        .send(
            "POST",
            "/analyze/text",
            Some(&token),
            Some(json!({"text": "hello there"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["message"], "Text analysis task submitted successfully");
    let id = task_id(&body);

    app.wait_for_task(id, user).await;
    let (status, task) = app
        .send("GET", &format!("/tasks/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["state"], "succeeded");
    assert_eq!(task["type"], "text");
}

// =============================================================================
// Ownership
// =============================================================================

#[tokio::test]
async fn test_foreign_session_is_not_found() {
    let app = create_test_app().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let alice_token = app.token_for(alice);
    let bob_token = app.token_for(bob);

    let (status, session) = app
        .send(
            "POST",
            "/sessions",
            Some(&alice_token),
            Some(json!({"session_type": "text"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = session["id"].as_i64().unwrap();

    let (status, body) = app
        .send("GET", &format!("/results/{}", session_id), Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // Submitting into someone else's session is refused up front
    let (status, _) = app
        .send(
            "POST",
            "/analyze/text",
            Some(&bob_token),
            Some(json!({"text": "hi", "session_id": session_id})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            &format!("/sessions/{}/end", session_id),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("GET", &format!("/results/{}", session_id), Some(&alice_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_foreign_task_is_not_found() {
    let app = create_test_app().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let (_, body) = app
        .send(
            "POST",
            "/analyze/text",
            Some(&app.token_for(alice)),
            Some(json!({"text": "hello"})),
        )
        .await;
    let id = task_id(&body);

    let (status, _) = app
        .send("GET", &format!("/tasks/{}", id), Some(&app.token_for(bob)), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "GET",
            &format!("/tasks/{}", uuid::Uuid::new_v4()),
            Some(&app.token_for(alice)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_results_without_sessions_is_not_found() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    let (status, body) = app.send("GET", "/results", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No analysis sessions found");

    let (status, _) = app
        .send("GET", "/results?type=smell", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_session_create_list_and_end() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    let (status, created) = app
        .send(
            "POST",
            "/sessions",
            Some(&token),
            Some(json!({"session_type": "audio", "metadata": {"device": "mic-1"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "active");
    assert_eq!(created["session_type"], "audio");
    assert_eq!(created["user"], user);
    assert_eq!(created["metadata"]["device"], "mic-1");
    assert!(created["end_time"].is_null());
    let id = created["id"].as_i64().unwrap();

    let (status, ended) = app
        .send("POST", &format!("/sessions/{}/end", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["status"], "completed");
    assert!(ended["end_time"].is_string());
    assert_eq!(ended["start_time"], created["start_time"]);

    let (status, list) = app
        .send("GET", "/sessions?limit=5", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = app
        .send(
            "POST",
            "/sessions",
            Some(&token),
            Some(json!({"session_type": "text", "metadata": [1, 2]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_for_new_user() {
    let app = create_test_app().await;
    let user = app.create_user("alice").await;
    let token = app.token_for(user);

    let (status, body) = app.send("GET", "/dashboard", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threats"], json!([]));
    assert_eq!(
        body["threat_counts"],
        json!({"CRITICAL": 0, "HIGH": 0, "LOW": 0, "MEDIUM": 0})
    );
    assert_eq!(body["source_counts"], json!({"audio": 0, "text": 0, "visual": 0}));
    assert_eq!(
        body["session_status"],
        json!({"audio": "inactive", "text": "inactive", "visual": "inactive"})
    );
}
