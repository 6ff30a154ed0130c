use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::ids;
use crate::journal::{self, NewEvent};
use crate::models::{Channel, CreateChannelDto, EventScope};
use crate::state::{self, AppState};

pub async fn create(state: &AppState, dto: CreateChannelDto) -> AppResult<(Channel, i64)> {
    if dto.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM channels WHERE name = ?")
        .bind(&dto.name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    if existing.is_some() {
        return Err(AppError::NameTaken(dto.name));
    }

    let id = ids::new_channel_id();
    sqlx::query(
        "INSERT INTO channels (id, name, description, created_at) VALUES (?, ?, ?, datetime('now'))",
    )
    .bind(&id)
    .bind(&dto.name)
    .bind(&dto.description)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    let event = NewEvent::new(
        "channel.created",
        EventScope {
            channel_id: Some(id.clone()),
            topic_id: None,
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "name": dto.name }),
    )
    .with_entity("channel", &id);
    let event_id = journal::emit(&mut tx, event).await?;

    let channel: Channel = sqlx::query_as("SELECT * FROM channels WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    Ok((channel, event_id))
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Channel>> {
    sqlx::query_as("SELECT * FROM channels ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
}

pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Channel> {
    sqlx::query_as("SELECT * FROM channels WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("channel {id}")))
}
