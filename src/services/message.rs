use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{AppError, AppResult};
use crate::ids;
use crate::journal::{self, NewEvent};
use crate::models::{CreateMessageDto, EventScope, Message, MoveMode, Page};
use crate::state::{self, AppState};

pub async fn create(state: &AppState, dto: CreateMessageDto) -> AppResult<(Message, i64)> {
    if dto.sender.trim().is_empty() {
        return Err(AppError::Validation("sender must not be empty".to_string()));
    }

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let channel_id: (String,) = sqlx::query_as("SELECT channel_id FROM topics WHERE id = ?")
        .bind(&dto.topic_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("topic {}", dto.topic_id)))?;

    let id = ids::new_message_id();
    sqlx::query(
        r#"INSERT INTO messages (id, topic_id, channel_id, sender, content_raw, version, created_at)
           VALUES (?, ?, ?, ?, ?, 1, datetime('now'))"#,
    )
    .bind(&id)
    .bind(&dto.topic_id)
    .bind(&channel_id.0)
    .bind(&dto.sender)
    .bind(&dto.content_raw)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    touch_topic(&mut tx, &dto.topic_id).await?;

    let event = NewEvent::new(
        "message.created",
        EventScope {
            channel_id: Some(channel_id.0),
            topic_id: Some(dto.topic_id.clone()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "sender": dto.sender }),
    )
    .with_entity("message", &id);
    let event_id = journal::emit(&mut tx, event).await?;

    let message: Message = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    dispatch_plugins(state, message.clone());
    Ok((message, event_id))
}

pub async fn edit(
    state: &AppState,
    id: &str,
    content_raw: String,
    expected_version: Option<i64>,
) -> AppResult<(Message, i64)> {
    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let current = fetch_for_update(&mut tx, id).await?;
    check_not_deleted(&current)?;
    check_version(&current, expected_version)?;

    sqlx::query(
        "UPDATE messages SET content_raw = ?, edited_at = datetime('now'), version = version + 1 WHERE id = ?",
    )
    .bind(&content_raw)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    touch_topic(&mut tx, &current.topic_id).await?;

    let event = NewEvent::new(
        "message.edited",
        EventScope {
            channel_id: Some(current.channel_id.clone()),
            topic_id: Some(current.topic_id.clone()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id }),
    )
    .with_entity("message", id);
    let event_id = journal::emit(&mut tx, event).await?;

    let message: Message = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    dispatch_plugins(state, message.clone());
    Ok((message, event_id))
}

pub async fn delete(
    state: &AppState,
    id: &str,
    actor: String,
    expected_version: Option<i64>,
) -> AppResult<(Message, i64)> {
    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let current = fetch_for_update(&mut tx, id).await?;
    check_not_deleted(&current)?;
    check_version(&current, expected_version)?;

    sqlx::query(
        "UPDATE messages SET deleted_at = datetime('now'), deleted_by = ?, version = version + 1 WHERE id = ?",
    )
    .bind(&actor)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::Database)?;

    let event = NewEvent::new(
        "message.deleted",
        EventScope {
            channel_id: Some(current.channel_id.clone()),
            topic_id: Some(current.topic_id.clone()),
            topic_id2: None,
        },
        serde_json::json!({ "id": id, "deleted_by": actor }),
    )
    .with_entity("message", id);
    let event_id = journal::emit(&mut tx, event).await?;

    let message: Message = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    state::publish_committed_event(&state.pool, &state.broadcast_tx, event_id).await?;
    Ok((message, event_id))
}

/// `move_topic`: moves one, later-by-id, or all-by-sender messages to
/// `to_topic_id`, which must stay within the same channel. Returns the
/// moved rows (ascending id, emission order) and their event ids.
pub async fn move_topic(
    state: &AppState,
    id: &str,
    to_topic_id: &str,
    mode: MoveMode,
    expected_version: Option<i64>,
) -> AppResult<(Vec<Message>, Vec<i64>)> {
    tracing::debug!(message_id = %id, to_topic_id, mode = %mode, "move_topic requested");

    let _guard = state.writer.lock().await;
    let mut tx = state.pool.begin().await.map_err(AppError::Database)?;

    let anchor = fetch_for_update(&mut tx, id).await?;
    check_not_deleted(&anchor)?;
    check_version(&anchor, expected_version)?;

    let dest_channel: (String,) = sqlx::query_as("SELECT channel_id FROM topics WHERE id = ?")
        .bind(to_topic_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("topic {to_topic_id}")))?;
    if dest_channel.0 != anchor.channel_id {
        return Err(AppError::CrossChannelMove);
    }

    let candidates: Vec<Message> = match mode {
        MoveMode::One => vec![anchor.clone()],
        MoveMode::Later => sqlx::query_as(
            "SELECT * FROM messages WHERE topic_id = ? AND id >= ? ORDER BY id ASC",
        )
        .bind(&anchor.topic_id)
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?,
        MoveMode::All => sqlx::query_as(
            "SELECT * FROM messages WHERE topic_id = ? AND sender = ? ORDER BY id ASC",
        )
        .bind(&anchor.topic_id)
        .bind(&anchor.sender)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?,
    };

    // Tie-breaking: re-confirm every candidate's version still matches what
    // was just read, before mutating any row.
    for candidate in &candidates {
        let live: (i64,) = sqlx::query_as("SELECT version FROM messages WHERE id = ?")
            .bind(&candidate.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        if live.0 != candidate.version {
            return Err(AppError::VersionConflict { current: live.0 });
        }
    }

    let source_topic_id = anchor.topic_id.clone();
    let mut moved = Vec::with_capacity(candidates.len());
    let mut event_ids = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        sqlx::query(
            "UPDATE messages SET topic_id = ?, version = version + 1 WHERE id = ?",
        )
        .bind(to_topic_id)
        .bind(&candidate.id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let event = NewEvent::new(
            "message.moved",
            EventScope {
                channel_id: Some(anchor.channel_id.clone()),
                topic_id: Some(to_topic_id.to_string()),
                topic_id2: Some(source_topic_id.clone()),
            },
            serde_json::json!({ "id": candidate.id }),
        )
        .with_entity("message", &candidate.id);
        let event_id = journal::emit(&mut tx, event).await?;
        event_ids.push(event_id);

        let updated: Message = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(&candidate.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        moved.push(updated);
    }

    touch_topic(&mut tx, to_topic_id).await?;
    touch_topic(&mut tx, &source_topic_id).await?;

    tx.commit().await.map_err(AppError::Database)?;
    drop(_guard);

    for event_id in &event_ids {
        state::publish_committed_event(&state.pool, &state.broadcast_tx, *event_id).await?;
    }
    Ok((moved, event_ids))
}

pub async fn list(
    pool: &SqlitePool,
    topic_id: &str,
    before_id: Option<&str>,
    after_id: Option<&str>,
    limit: i64,
) -> AppResult<Page<Message>> {
    let mut rows: Vec<Message> = match (before_id, after_id) {
        (Some(before), _) => sqlx::query_as(
            "SELECT * FROM messages WHERE topic_id = ? AND id < ? ORDER BY id DESC LIMIT ?",
        )
        .bind(topic_id)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
        (None, Some(after)) => sqlx::query_as(
            "SELECT * FROM messages WHERE topic_id = ? AND id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(topic_id)
        .bind(after)
        .bind(limit + 1)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
        (None, None) => sqlx::query_as(
            "SELECT * FROM messages WHERE topic_id = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(topic_id)
        .bind(limit + 1)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
    };

    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    if before_id.is_some() {
        rows.reverse();
    }
    Ok(Page {
        items: rows,
        has_more,
    })
}

/// Full-text search over `messages.content_raw` via the `messages_fts`
/// virtual table. Callers must check `AppState::fts_enabled` first — with
/// the index absent, `MATCH` fails with a database error rather than an
/// empty result set.
pub async fn search(
    pool: &SqlitePool,
    query: &str,
    topic_id: Option<&str>,
    limit: i64,
) -> AppResult<Vec<Message>> {
    if query.trim().is_empty() {
        return Err(AppError::Validation("q must not be empty".to_string()));
    }

    let rows: Vec<Message> = match topic_id {
        Some(topic_id) => sqlx::query_as(
            r#"SELECT m.* FROM messages m
               JOIN messages_fts f ON f.rowid = m.rowid
               WHERE messages_fts MATCH ? AND m.topic_id = ?
               ORDER BY m.id DESC LIMIT ?"#,
        )
        .bind(query)
        .bind(topic_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
        None => sqlx::query_as(
            r#"SELECT m.* FROM messages m
               JOIN messages_fts f ON f.rowid = m.rowid
               WHERE messages_fts MATCH ?
               ORDER BY m.id DESC LIMIT ?"#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?,
    };
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Message> {
    sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("message {id}")))
}

async fn fetch_for_update(tx: &mut Transaction<'_, Sqlite>, id: &str) -> AppResult<Message> {
    sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("message {id}")))
}

fn check_not_deleted(message: &Message) -> AppResult<()> {
    if message.is_deleted() {
        Err(AppError::AlreadyDeleted)
    } else {
        Ok(())
    }
}

fn check_version(message: &Message, expected_version: Option<i64>) -> AppResult<()> {
    match expected_version {
        Some(expected) if expected != message.version => Err(AppError::VersionConflict {
            current: message.version,
        }),
        _ => Ok(()),
    }
}

async fn touch_topic(tx: &mut Transaction<'_, Sqlite>, topic_id: &str) -> AppResult<()> {
    sqlx::query("UPDATE topics SET updated_at = datetime('now') WHERE id = ?")
        .bind(topic_id)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;
    Ok(())
}

/// Fire-and-forget dispatch after `message.created`/`message.edited` commit.
/// Never awaited by the caller — plugin failures must not affect the
/// originating request.
fn dispatch_plugins(state: &AppState, message: Message) {
    if state.plugins.is_empty() {
        return;
    }
    let plugins = state.plugins.clone();
    let pool = state.pool.clone();
    let writer = state.writer.clone();
    let broadcast_tx = state.broadcast_tx.clone();
    tokio::spawn(async move {
        plugins.run_for_message(pool, writer, broadcast_tx, message).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateChannelDto, CreateTopicDto};
    use crate::services::{channel, topic};
    use crate::test_support::{test_state, test_state_with_fts};

    async fn setup_topic(state: &AppState) -> String {
        let (ch, _) = channel::create(
            state,
            CreateChannelDto {
                name: "general".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        let (tp, _) = topic::create(
            state,
            CreateTopicDto {
                channel_id: ch.id,
                title: "first".to_string(),
            },
        )
        .await
        .unwrap();
        tp.id
    }

    #[tokio::test]
    async fn create_then_edit_bumps_version() {
        let state = test_state().await;
        let topic_id = setup_topic(&state).await;
        let (msg, _) = create(
            &state,
            CreateMessageDto {
                topic_id,
                sender: "alice".to_string(),
                content_raw: "hi".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(msg.version, 1);

        let (edited, _) = edit(&state, &msg.id, "hi there".to_string(), Some(1)).await.unwrap();
        assert_eq!(edited.version, 2);
        assert_eq!(edited.content_raw, "hi there");
    }

    #[tokio::test]
    async fn edit_with_stale_expected_version_conflicts() {
        let state = test_state().await;
        let topic_id = setup_topic(&state).await;
        let (msg, _) = create(
            &state,
            CreateMessageDto {
                topic_id,
                sender: "alice".to_string(),
                content_raw: "hi".to_string(),
            },
        )
        .await
        .unwrap();
        edit(&state, &msg.id, "v2".to_string(), None).await.unwrap();

        let err = edit(&state, &msg.id, "v3".to_string(), Some(1)).await.unwrap_err();
        assert_eq!(err.code(), "VERSION_CONFLICT");
    }

    #[tokio::test]
    async fn delete_then_edit_is_already_deleted() {
        let state = test_state().await;
        let topic_id = setup_topic(&state).await;
        let (msg, _) = create(
            &state,
            CreateMessageDto {
                topic_id,
                sender: "alice".to_string(),
                content_raw: "hi".to_string(),
            },
        )
        .await
        .unwrap();
        delete(&state, &msg.id, "alice".to_string(), None).await.unwrap();

        let err = edit(&state, &msg.id, "nope".to_string(), None).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_DELETED");
    }

    #[tokio::test]
    async fn move_across_channels_is_rejected() {
        let state = test_state().await;
        let topic_a = setup_topic(&state).await;
        let (ch_y, _) = channel::create(
            &state,
            CreateChannelDto {
                name: "other".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        let (topic_b, _) = topic::create(
            &state,
            CreateTopicDto {
                channel_id: ch_y.id,
                title: "elsewhere".to_string(),
            },
        )
        .await
        .unwrap();

        let (msg, _) = create(
            &state,
            CreateMessageDto {
                topic_id: topic_a,
                sender: "alice".to_string(),
                content_raw: "hi".to_string(),
            },
        )
        .await
        .unwrap();

        let err = move_topic(&state, &msg.id, &topic_b.id, MoveMode::One, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CROSS_CHANNEL_MOVE");
    }

    #[tokio::test]
    async fn move_later_moves_all_ids_from_anchor_onward() {
        let state = test_state().await;
        let topic_id = setup_topic(&state).await;
        let (ch, _) = (
            channel::get(&state.pool, &topic::get(&state.pool, &topic_id).await.unwrap().channel_id)
                .await
                .unwrap(),
            (),
        );
        let (dest, _) = topic::create(
            &state,
            CreateTopicDto {
                channel_id: ch.id,
                title: "dest".to_string(),
            },
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let (m, _) = create(
                &state,
                CreateMessageDto {
                    topic_id: topic_id.clone(),
                    sender: "alice".to_string(),
                    content_raw: format!("msg {i}"),
                },
            )
            .await
            .unwrap();
            ids.push(m.id);
        }

        let (moved, _) = move_topic(&state, &ids[1], &dest.id, MoveMode::Later, None)
            .await
            .unwrap();
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|m| m.topic_id == dest.id));
    }

    #[tokio::test]
    async fn search_matches_content_and_respects_topic_filter() {
        let state = test_state_with_fts().await;
        let topic_id = setup_topic(&state).await;
        create(
            &state,
            CreateMessageDto {
                topic_id: topic_id.clone(),
                sender: "alice".to_string(),
                content_raw: "the quick brown fox".to_string(),
            },
        )
        .await
        .unwrap();
        create(
            &state,
            CreateMessageDto {
                topic_id: topic_id.clone(),
                sender: "bob".to_string(),
                content_raw: "completely unrelated text".to_string(),
            },
        )
        .await
        .unwrap();

        let results = search(&state.pool, "fox", None, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sender, "alice");

        let scoped = search(&state.pool, "fox", Some(&topic_id), 10).await.unwrap();
        assert_eq!(scoped.len(), 1);

        let empty = search(&state.pool, "giraffe", None, 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let state = test_state_with_fts().await;
        let err = search(&state.pool, "  ", None, 10).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
