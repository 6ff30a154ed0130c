//! The append-only event journal.
//!
//! [`emit`] is a free function, not a method on any owning type, because it
//! must only ever be called from inside a write transaction that an entity
//! service already holds open — it never opens its own transaction or
//! connection.

use sqlx::{Sqlite, Transaction};

use crate::error::{AppError, AppResult};
use crate::models::{EventEntity, EventScope};

/// An event awaiting assignment of its `event_id`, built by an entity
/// service immediately before commit.
pub struct NewEvent {
    pub name: &'static str,
    pub scope: EventScope,
    pub entity: Option<EventEntity>,
    pub data: serde_json::Value,
}

impl NewEvent {
    pub fn new(name: &'static str, scope: EventScope, data: serde_json::Value) -> Self {
        Self {
            name,
            scope,
            entity: None,
            data,
        }
    }

    pub fn with_entity(mut self, entity_type: &str, id: impl Into<String>) -> Self {
        self.entity = Some(EventEntity {
            entity_type: entity_type.to_string(),
            id: id.into(),
        });
        self
    }
}

/// Append `event` to the journal within `tx` and return its assigned,
/// strictly-increasing `event_id`. Commit order of the enclosing transaction
/// is what ultimately orders the journal — this only reserves the row.
pub async fn emit(tx: &mut Transaction<'_, Sqlite>, event: NewEvent) -> AppResult<i64> {
    let data_json = serde_json::to_string(&event.data).map_err(|_| AppError::Internal)?;
    let entity_type = event.entity.as_ref().map(|e| e.entity_type.as_str());
    let entity_id = event.entity.as_ref().map(|e| e.id.as_str());

    let result = sqlx::query(
        r#"
        INSERT INTO events
            (ts, name, scope_channel_id, scope_topic_id, scope_topic_id2, entity_type, entity_id, data_json)
        VALUES (datetime('now'), ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.name)
    .bind(&event.scope.channel_id)
    .bind(&event.scope.topic_id)
    .bind(&event.scope.topic_id2)
    .bind(entity_type)
    .bind(entity_id)
    .bind(data_json)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(result.last_insert_rowid())
}
