pub mod attachments;
pub mod channels;
pub mod events;
pub mod messages;
pub mod topics;

use std::process;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /health` — unauthenticated liveness and identity probe, used by
/// peers contending for the writer lock to decide if it is stale.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "instance_id": state.instance_id,
        "db_id": state.db_id,
        "schema_version": state.schema_version,
        "protocol_version": state.protocol_version,
        "pid": process::id(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}
