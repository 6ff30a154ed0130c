mod common;

use axum::http::StatusCode;
use serde_json::json;

async fn setup_topic(app: axum::Router) -> String {
    let channel = common::create_channel(app.clone(), "general").await;
    let topic = common::create_topic(app, channel["channel"]["id"].as_str().unwrap(), "intro").await;
    topic["topic"]["id"].as_str().unwrap().to_owned()
}

/// Concrete scenario: two identical attachment posts dedupe on the second.
#[tokio::test]
async fn duplicate_attachment_is_deduped() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;

    let body = json!({
        "kind": "url",
        "value_json": { "url": "https://example.com" },
        "dedupe_key": "u:example",
    });

    let (status, first) = common::post_json_authed(
        app.clone(),
        &format!("/api/v1/topics/{topic_id}/attachments"),
        common::AUTH_TOKEN,
        body.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(first["event_id"].is_number());
    assert_eq!(first["deduplicated"], false);

    let (status, second) = common::post_json_authed(
        app.clone(),
        &format!("/api/v1/topics/{topic_id}/attachments"),
        common::AUTH_TOKEN,
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["event_id"], serde_json::Value::Null);
    assert_eq!(second["deduplicated"], true);

    let (status, listed) =
        common::get_no_auth(app, &format!("/api/v1/topics/{topic_id}/attachments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["attachments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn non_http_url_scheme_is_rejected() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;

    let (status, body) = common::post_json_authed(
        app,
        &format!("/api/v1/topics/{topic_id}/attachments"),
        common::AUTH_TOKEN,
        json!({
            "kind": "url",
            "value_json": { "url": "javascript:alert(1)" },
            "dedupe_key": "bad",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn list_attachments_filters_by_kind() {
    let app = common::test_app().await;
    let topic_id = setup_topic(app.clone()).await;

    common::post_json_authed(
        app.clone(),
        &format!("/api/v1/topics/{topic_id}/attachments"),
        common::AUTH_TOKEN,
        json!({
            "kind": "url",
            "value_json": { "url": "https://example.com/a" },
            "dedupe_key": "a",
        }),
    )
    .await;
    common::post_json_authed(
        app.clone(),
        &format!("/api/v1/topics/{topic_id}/attachments"),
        common::AUTH_TOKEN,
        json!({
            "kind": "file",
            "value_json": { "name": "report.pdf" },
            "dedupe_key": "b",
        }),
    )
    .await;

    let (status, body) = common::get_no_auth(
        app,
        &format!("/api/v1/topics/{topic_id}/attachments?kind=file"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attachments = body["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["kind"], "file");
}
