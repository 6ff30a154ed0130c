use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequireAuth;
use crate::error::AppResult;
use crate::models::{CreateTopicDto, RenameTopicDto};
use crate::services::topic;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTopicsQuery {
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/v1/channels/{id}/topics`
pub async fn list_topics(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<ListTopicsQuery>,
) -> AppResult<Json<Value>> {
    let page = topic::list_for_channel(&state.pool, &channel_id, query.offset, query.limit).await?;
    Ok(Json(json!({ "topics": page.items, "has_more": page.has_more })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub channel_id: String,
    pub title: String,
}

/// `POST /api/v1/topics`
pub async fn create_topic(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<CreateTopicRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let dto = CreateTopicDto {
        channel_id: body.channel_id,
        title: body.title,
    };
    let (topic, event_id) = topic::create(&state, dto).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "topic": topic, "event_id": event_id })),
    ))
}

/// `PATCH /api/v1/topics/{id}` — rename (title only).
pub async fn rename_topic(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameTopicDto>,
) -> AppResult<Json<Value>> {
    let (topic, event_id) = topic::rename(&state, &id, body.title).await?;
    Ok(Json(json!({ "topic": topic, "event_id": event_id })))
}
