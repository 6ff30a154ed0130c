mod common;

use axum::http::StatusCode;
use serde_json::json;

async fn setup_topic(app: axum::Router) -> String {
    let channel = common::create_channel(app.clone(), "general").await;
    let channel_id = channel["channel"]["id"].as_str().unwrap().to_owned();
    let topic = common::create_topic(app, &channel_id, "intro").await;
    topic["topic"]["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn create_then_list_messages() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;

    let created = common::create_message(app.clone(), &topic_id, "alice", "hello").await;
    assert_eq!(created["message"]["version"], 1);

    let (status, body) =
        common::get_no_auth(app, &format!("/api/v1/messages?topic_id={topic_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

/// Concrete scenario: editing with a stale `expected_version` conflicts and
/// the response carries `details.current`.
#[tokio::test]
async fn edit_with_stale_version_conflicts() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;
    let created = common::create_message(app.clone(), &topic_id, "alice", "hello").await;
    let id = created["message"]["id"].as_str().unwrap().to_owned();

    // Bump the version once via a legitimate edit.
    common::patch_json_authed(
        app.clone(),
        &format!("/api/v1/messages/{id}"),
        common::AUTH_TOKEN,
        json!({ "op": "edit", "content_raw": "hello v2", "expected_version": 1 }),
    )
    .await;

    let (status, body) = common::patch_json_authed(
        app,
        &format!("/api/v1/messages/{id}"),
        common::AUTH_TOKEN,
        json!({ "op": "edit", "content_raw": "hi", "expected_version": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VERSION_CONFLICT");
    assert_eq!(body["details"]["current"], 2);
}

#[tokio::test]
async fn delete_then_edit_is_already_deleted() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;
    let created = common::create_message(app.clone(), &topic_id, "alice", "hello").await;
    let id = created["message"]["id"].as_str().unwrap().to_owned();

    let (status, _) = common::patch_json_authed(
        app.clone(),
        &format!("/api/v1/messages/{id}"),
        common::AUTH_TOKEN,
        json!({ "op": "delete", "actor": "alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::patch_json_authed(
        app,
        &format!("/api/v1/messages/{id}"),
        common::AUTH_TOKEN,
        json!({ "op": "edit", "content_raw": "too late" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_DELETED");
}

/// Concrete scenario: moving across channels is rejected before any row changes.
#[tokio::test]
async fn move_across_channels_is_rejected() {
    let app = common::test_app().await;
    let channel_a = common::create_channel(app.clone(), "alpha").await;
    let channel_b = common::create_channel(app.clone(), "beta").await;
    let topic_a = common::create_topic(
        app.clone(),
        channel_a["channel"]["id"].as_str().unwrap(),
        "a",
    )
    .await;
    let topic_b = common::create_topic(
        app.clone(),
        channel_b["channel"]["id"].as_str().unwrap(),
        "b",
    )
    .await;
    let message = common::create_message(
        app.clone(),
        topic_a["topic"]["id"].as_str().unwrap(),
        "alice",
        "hello",
    )
    .await;
    let message_id = message["message"]["id"].as_str().unwrap();

    let (status, body) = common::patch_json_authed(
        app,
        &format!("/api/v1/messages/{message_id}"),
        common::AUTH_TOKEN,
        json!({
            "op": "move_topic",
            "to_topic_id": topic_b["topic"]["id"],
            "mode": "one",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CROSS_CHANNEL_MOVE");
}

#[tokio::test]
async fn move_all_without_confirm_is_rejected() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;
    let message = common::create_message(app.clone(), &topic_id, "alice", "hello").await;
    let message_id = message["message"]["id"].as_str().unwrap();
    let other_topic = common::create_topic(
        app.clone(),
        message["message"]["channel_id"].as_str().unwrap(),
        "other",
    )
    .await;

    let (status, body) = common::patch_json_authed(
        app,
        &format!("/api/v1/messages/{message_id}"),
        common::AUTH_TOKEN,
        json!({
            "op": "move_topic",
            "to_topic_id": other_topic["topic"]["id"],
            "mode": "all",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn search_without_fts_enabled_is_rejected() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;
    common::create_message(app.clone(), &topic_id, "alice", "the quick brown fox").await;

    let (status, body) = common::get_no_auth(app, "/api/v1/messages/search?q=fox").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn search_with_fts_enabled_matches_content() {
    let app = common::test_app_with_fts().await;
    let topic_id = setup_topic(app.clone()).await;
    common::create_message(app.clone(), &topic_id, "alice", "the quick brown fox").await;
    common::create_message(app.clone(), &topic_id, "bob", "completely unrelated text").await;

    let (status, body) = common::get_no_auth(app, "/api/v1/messages/search?q=fox").await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["sender"], "alice");
}
