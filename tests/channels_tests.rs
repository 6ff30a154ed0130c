mod common;

use axum::http::StatusCode;
use serde_json::json;

/// Concrete scenario: create then list returns the created channel.
#[tokio::test]
async fn create_then_list_channel() {
    let app = common::test_app().await;

    let created = common::create_channel(app.clone(), "general").await;
    assert_eq!(created["channel"]["name"], "general");
    assert_eq!(created["event_id"], 1);
    assert!(created["channel"]["id"].as_str().unwrap().starts_with("ch_"));

    let (status, body) = common::get_no_auth(app, "/api/v1/channels").await;
    assert_eq!(status, StatusCode::OK);
    let channels = body["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["name"], "general");
}

#[tokio::test]
async fn create_channel_without_auth_is_rejected() {
    let app = common::test_app().await;
    let (status, body) = common::post_json(app, "/api/v1/channels", json!({ "name": "general" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "MISSING_AUTH");
}

#[tokio::test]
async fn duplicate_channel_name_is_rejected() {
    let app = common::test_app().await;
    common::create_channel(app.clone(), "general").await;

    let (status, body) = common::post_json_authed(
        app,
        "/api/v1/channels",
        common::AUTH_TOKEN,
        json!({ "name": "general" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NAME_TAKEN");
}
