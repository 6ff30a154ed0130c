use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequireAuth;
use crate::error::AppResult;
use crate::models::CreateAttachmentDto;
use crate::services::attachment;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListAttachmentsQuery {
    pub kind: Option<String>,
}

/// `GET /api/v1/topics/{id}/attachments?kind=`
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<ListAttachmentsQuery>,
) -> AppResult<Json<Value>> {
    let page = attachment::list(&state.pool, &topic_id, query.kind.as_deref()).await?;
    Ok(Json(json!({ "attachments": page.items, "has_more": page.has_more })))
}

/// `POST /api/v1/topics/{id}/attachments` — dedupe-aware.
pub async fn add_attachment(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(dto): Json<CreateAttachmentDto>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (attachment, event_id, deduplicated) = attachment::add(&state, &topic_id, dto).await?;
    let status = if deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(json!({
            "attachment": attachment,
            "event_id": event_id,
            "deduplicated": deduplicated,
        })),
    ))
}
