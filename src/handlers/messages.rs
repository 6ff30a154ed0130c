use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequireAuth;
use crate::error::{AppError, AppResult};
use crate::models::{CreateMessageDto, MessagePatch, MoveMode};
use crate::services::message;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub topic_id: String,
    pub before_id: Option<String>,
    pub after_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/v1/messages?topic_id=&before_id=&after_id=&limit=`
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<Json<Value>> {
    let page = message::list(
        &state.pool,
        &query.topic_id,
        query.before_id.as_deref(),
        query.after_id.as_deref(),
        query.limit,
    )
    .await?;
    Ok(Json(json!({ "messages": page.items, "has_more": page.has_more })))
}

#[derive(Debug, Deserialize)]
pub struct SearchMessagesQuery {
    pub q: String,
    pub topic_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// `GET /api/v1/messages/search?q=&topic_id=&limit=`
pub async fn search_messages(
    State(state): State<AppState>,
    Query(query): Query<SearchMessagesQuery>,
) -> AppResult<Json<Value>> {
    if !state.fts_enabled {
        return Err(AppError::Validation("search index not enabled".to_string()));
    }
    let messages = message::search(
        &state.pool,
        &query.q,
        query.topic_id.as_deref(),
        query.limit,
    )
    .await?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub topic_id: String,
    pub sender: String,
    pub content_raw: String,
}

/// `POST /api/v1/messages`
pub async fn create_message(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let dto = CreateMessageDto {
        topic_id: body.topic_id,
        sender: body.sender,
        content_raw: body.content_raw,
    };
    let (message, event_id) = message::create(&state, dto).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message, "event_id": event_id })),
    ))
}

/// `PATCH /api/v1/messages/{id}` — body `{op: "edit"|"delete"|"move_topic", ...}`.
pub async fn patch_message(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<MessagePatch>,
) -> AppResult<Json<Value>> {
    match patch {
        MessagePatch::Edit {
            content_raw,
            expected_version,
        } => {
            let (message, event_id) =
                message::edit(&state, &id, content_raw, expected_version).await?;
            Ok(Json(json!({ "message": message, "event_id": event_id })))
        }
        MessagePatch::Delete {
            actor,
            expected_version,
        } => {
            let (message, event_id) = message::delete(&state, &id, actor, expected_version).await?;
            Ok(Json(json!({ "message": message, "event_id": event_id })))
        }
        MessagePatch::MoveTopic {
            to_topic_id,
            mode,
            expected_version,
            confirm,
        } => {
            // "all" mode moves every message from the sender across the
            // topic; require the API caller to explicitly confirm it.
            if mode == MoveMode::All && !confirm {
                return Err(AppError::Validation(
                    "mode \"all\" requires confirm: true".to_string(),
                ));
            }
            let (messages, event_ids) =
                message::move_topic(&state, &id, &to_topic_id, mode, expected_version).await?;
            Ok(Json(json!({ "messages": messages, "event_ids": event_ids })))
        }
    }
}
