// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    routing::{get, patch, post},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use hubd::config::LimitsConfig;
use hubd::plugins::PluginPipeline;
use hubd::state::AppState;
use hubd::{db, handlers, websocket};

pub const AUTH_TOKEN: &str = "integration-test-token";

/// Build a fresh `AppState` backed by a tempdir SQLite database and wire it
/// into the same route table `main.rs` exposes under `/api/v1`, minus the
/// daemon-lifecycle concerns (rate limiting, shutdown draining) that don't
/// matter for a single in-process test call.
pub async fn test_app() -> Router {
    build_test_app(false).await
}

/// Same as [`test_app`] but with the full-text-search index enabled, for
/// tests covering `GET /api/v1/messages/search`.
pub async fn test_app_with_fts() -> Router {
    build_test_app(true).await
}

async fn build_test_app(fts_enabled: bool) -> Router {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("hub.db");
    let pool = db::create_pool(&db_path).await.expect("create pool");
    if fts_enabled {
        db::enable_fts(&pool).await.expect("enable fts");
    }
    std::mem::forget(dir);

    let workspace_root = db_path.parent().unwrap().to_path_buf();
    let state = AppState::new(
        pool,
        Some(AUTH_TOKEN.to_string()),
        PluginPipeline::new(Vec::new(), workspace_root.clone()),
        workspace_root,
        LimitsConfig::default(),
        "test-instance".to_string(),
        "test-db".to_string(),
        db::SCHEMA_VERSION,
        1,
        fts_enabled,
    );

    let api = Router::new()
        .route("/channels", get(handlers::channels::list_channels))
        .route("/channels", post(handlers::channels::create_channel))
        .route("/channels/:id/topics", get(handlers::topics::list_topics))
        .route("/topics", post(handlers::topics::create_topic))
        .route("/topics/:id", patch(handlers::topics::rename_topic))
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages", post(handlers::messages::create_message))
        .route("/messages/:id", patch(handlers::messages::patch_message))
        .route("/messages/search", get(handlers::messages::search_messages))
        .route(
            "/topics/:id/attachments",
            get(handlers::attachments::list_attachments),
        )
        .route(
            "/topics/:id/attachments",
            post(handlers::attachments::add_attachment),
        )
        .route("/events", get(handlers::events::list_events));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
}

// ── Request helpers ──────────────────────────────────────────────────────────

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn post_json_authed(app: Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn patch_json_authed(app: Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn get_no_auth(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ── Scenario helpers ─────────────────────────────────────────────────────────

/// Create a channel and return the full response body.
pub async fn create_channel(app: Router, name: &str) -> Value {
    let (status, body) =
        post_json_authed(app, "/api/v1/channels", AUTH_TOKEN, serde_json::json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED, "setup create_channel failed: {body}");
    body
}

/// Create a topic in a channel and return the full response body.
pub async fn create_topic(app: Router, channel_id: &str, title: &str) -> Value {
    let (status, body) = post_json_authed(
        app,
        "/api/v1/topics",
        AUTH_TOKEN,
        serde_json::json!({ "channel_id": channel_id, "title": title }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "setup create_topic failed: {body}");
    body
}

/// Create a message in a topic and return the full response body.
pub async fn create_message(app: Router, topic_id: &str, sender: &str, content_raw: &str) -> Value {
    let (status, body) = post_json_authed(
        app,
        "/api/v1/messages",
        AUTH_TOKEN,
        serde_json::json!({ "topic_id": topic_id, "sender": sender, "content_raw": content_raw }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "setup create_message failed: {body}");
    body
}
