use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::services::event;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub after: i64,
    #[serde(default = "default_tail")]
    pub tail: i64,
}

fn default_tail() -> i64 {
    100
}

/// `GET /api/v1/events?after=&tail=` — historical event query, primarily
/// used by clients recovering from a closed WebSocket connection.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<Value>> {
    let events = event::list_after(&state.pool, query.after, query.tail).await?;
    Ok(Json(json!({ "events": events })))
}
