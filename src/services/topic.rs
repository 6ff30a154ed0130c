use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::ids;
use crate::journal::{self, NewEvent};
use crate::models::{CreateTopicDto, EventScope, Page, Topic};
use crate::state::{self, AppState};

pub async fn create(state: &AppState, dto: CreateTopicDto) -> AppResult<(Topic, i64)> {
    if dto.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let channel_exists: Option<(String,)> = sqlx::query_as("SELECT id FROM channels WHERE id = ?")
        .bind(&dto.channel_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    if channel_exists.is_none() {
        return Err(AppError::NotFound(format!("channel {}", dto.channel_id)));
    }

    let id = ids::new_topic_id();
    sqlx::query(
        "INSERT INTO topics (id, channel_id, title, created_at, updated_at) VALUES (?, ?, ?, datetime('now'), datetime('now'))",
    )
    .bind(&id)
    .bind(&dto.channel_id)
    .bind(&dto.title)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    let event = NewEvent::new(
        "topic.created",
        EventScope {
            channel_id: Some(dto.channel_id.clone()),
            topic_id: Some(id.clone()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "title": dto.title }),
    )
    .with_entity("topic", &id);
    let event_id = journal::emit(&mut tx, event).await?;

    let topic: Topic = sqlx::query_as("SELECT * FROM topics WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    Ok((topic, event_id))
}

pub async fn rename(state: &AppState, id: &str, title: String) -> AppResult<(Topic, i64)> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let topic: Topic = sqlx::query_as("SELECT * FROM topics WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("topic {id}")))?;

    sqlx::query("UPDATE topics SET title = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(&title)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    let event = NewEvent::new(
        "topic.renamed",
        EventScope {
            channel_id: Some(topic.channel_id.clone()),
            topic_id: Some(id.to_string()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "title": title }),
    )
    .with_entity("topic", id);
    let event_id = journal::emit(&mut tx, event).await?;

    let updated: Topic = sqlx::query_as("SELECT * FROM topics WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    Ok((updated, event_id))
}

pub async fn list_for_channel(
    pool: &SqlitePool,
    channel_id: &str,
    offset: i64,
    limit: i64,
) -> AppResult<Page<Topic>> {
    let mut rows: Vec<Topic> = sqlx::query_as(
        "SELECT * FROM topics WHERE channel_id = ? ORDER BY created_at ASC LIMIT ? OFFSET ?",
    )
    .bind(channel_id)
    .bind(limit + 1)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(AppError::Database)?;

    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    Ok(Page {
        items: rows,
        has_more,
    })
}

pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Topic> {
    sqlx::query_as("SELECT * FROM topics WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("topic {id}")))
}
