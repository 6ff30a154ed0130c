use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::ids;
use crate::journal::{self, NewEvent};
use crate::models::{Attachment, AttachmentRow, CreateAttachmentDto, EventScope, Page};
use crate::security;
use crate::state::{self, AppState};

/// Adds an attachment, or silently returns the existing row with
/// `deduplicated = true` if one already matches the dedupe tuple.
pub async fn add(
    state: &AppState,
    topic_id: &str,
    dto: CreateAttachmentDto,
) -> AppResult<(Attachment, Option<i64>, bool)> {
    if dto.kind.trim().is_empty() {
        return Err(AppError::Validation("kind must not be empty".to_string()));
    }
    if let Some(key) = &dto.key {
        security::reject_control_bytes(key).map_err(AppError::Validation)?;
    }
    if dto.kind == "url" {
        let url = dto
            .value_json
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Validation("url attachments require value_json.url".to_string()))?;
        security::validate_http_url(url).map_err(AppError::Validation)?;
    }

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let channel_id: (String,) = sqlx::query_as("SELECT channel_id FROM topics WHERE id = ?")
        .bind(topic_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("topic {topic_id}")))?;

    let existing: Option<AttachmentRow> = sqlx::query_as(
        "SELECT * FROM attachments WHERE topic_id = ? AND kind = ? AND key IS ? AND dedupe_key = ?",
    )
    .bind(topic_id)
    .bind(&dto.kind)
    .bind(&dto.key)
    .bind(&dto.dedupe_key)
    .fetch_optional(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    if let Some(row) = existing {
        tx.commit().await.map_err(AppError::Database)?;
        let attachment: Attachment = row.try_into().map_err(|_| AppError::Internal)?;
        return Ok((attachment, None, true));
    }

    let value_json = serde_json::to_string(&dto.value_json).map_err(|_| AppError::Internal)?;
    let id = ids::new_attachment_id();
    sqlx::query(
        r#"INSERT INTO attachments
           (id, topic_id, kind, key, value_json, dedupe_key, source_message_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))"#,
    )
    .bind(&id)
    .bind(topic_id)
    .bind(&dto.kind)
    .bind(&dto.key)
    .bind(&value_json)
    .bind(&dto.dedupe_key)
    .bind(&dto.source_message_id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    let event = NewEvent::new(
        "topic.attachment_added",
        EventScope {
            channel_id: Some(channel_id.0),
            topic_id: Some(topic_id.to_string()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "kind": dto.kind }),
    )
    .with_entity("attachment", &id);
    let event_id = journal::emit(&mut tx, event).await?;

    let row: AttachmentRow = sqlx::query_as("SELECT * FROM attachments WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    let attachment: Attachment = row.try_into().map_err(|_| AppError::Internal)?;
    Ok((attachment, Some(event_id), false))
}

pub async fn list(
    pool: &SqlitePool,
    topic_id: &str,
    kind: Option<&str>,
) -> AppResult<Page<Attachment>> {
    let rows: Vec<AttachmentRow> = match kind {
        Some(kind) => sqlx::query_as(
            "SELECT * FROM attachments WHERE topic_id = ? AND kind = ? ORDER BY created_at ASC",
        )
        .bind(topic_id)
        .bind(kind)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
        None => sqlx::query_as("SELECT * FROM attachments WHERE topic_id = ? ORDER BY created_at ASC")
            .bind(topic_id)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?,
    };

    let items = rows
        .into_iter()
        .map(Attachment::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::Internal)?;
    Ok(Page {
        items,
        has_more: false,
    })
}
