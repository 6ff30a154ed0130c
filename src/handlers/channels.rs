use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequireAuth;
use crate::error::AppResult;
use crate::models::CreateChannelDto;
use crate::services::channel;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
}

/// `GET /api/v1/channels`
pub async fn list_channels(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let channels = channel::list(&state.pool).await?;
    Ok(Json(json!({ "channels": channels })))
}

/// `POST /api/v1/channels`
pub async fn create_channel(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<CreateChannelRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let dto = CreateChannelDto {
        name: body.name,
        description: body.description,
    };
    let (channel, event_id) = channel::create(&state, dto).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "channel": channel, "event_id": event_id })),
    ))
}
