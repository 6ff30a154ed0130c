use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{Event, EventRow};

/// `GET /api/v1/events?after=&tail=`: returns up to `tail` events with
/// `event_id > after`, ascending.
pub async fn list_after(pool: &SqlitePool, after: i64, tail: i64) -> AppResult<Vec<Event>> {
    let rows: Vec<EventRow> = sqlx::query_as(
        r#"SELECT event_id, ts, name, scope_channel_id, scope_topic_id, scope_topic_id2,
                  entity_type, entity_id, data_json
           FROM events WHERE event_id > ? ORDER BY event_id ASC LIMIT ?"#,
    )
    .bind(after)
    .bind(tail)
    .fetch_all(pool)
    .await
    .map_err(AppError::Database)?;

    rows.into_iter()
        .map(Event::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::Internal)
}

pub async fn max_event_id(pool: &SqlitePool) -> AppResult<i64> {
    let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(event_id) FROM events")
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
    Ok(row.0.unwrap_or(0))
}

/// Events in `(after, until]`, ordered ascending, matching the given
/// subscription filter. `None` for either filter slice means "all".
pub async fn list_range_filtered(
    pool: &SqlitePool,
    after: i64,
    until: i64,
    channels: Option<&[String]>,
    topics: Option<&[String]>,
) -> AppResult<Vec<Event>> {
    let rows: Vec<EventRow> = sqlx::query_as(
        r#"SELECT event_id, ts, name, scope_channel_id, scope_topic_id, scope_topic_id2,
                  entity_type, entity_id, data_json
           FROM events WHERE event_id > ? AND event_id <= ? ORDER BY event_id ASC"#,
    )
    .bind(after)
    .bind(until)
    .fetch_all(pool)
    .await
    .map_err(AppError::Database)?;

    let events = rows
        .into_iter()
        .map(Event::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::Internal)?;

    Ok(events
        .into_iter()
        .filter(|e| matches_subscription(e, channels, topics))
        .collect())
}

pub fn matches_subscription(
    event: &Event,
    channels: Option<&[String]>,
    topics: Option<&[String]>,
) -> bool {
    let channels_empty = channels.map(|c| c.is_empty()).unwrap_or(true);
    let topics_empty = topics.map(|t| t.is_empty()).unwrap_or(true);
    if channels_empty && topics_empty {
        return true;
    }

    let channel_match = channels
        .map(|list| {
            event
                .scope
                .channel_id
                .as_deref()
                .map(|id| list.iter().any(|c| c == id))
                .unwrap_or(false)
        })
        .unwrap_or(false);
    let topic_match = topics
        .map(|list| {
            let in_topic = event
                .scope
                .topic_id
                .as_deref()
                .map(|id| list.iter().any(|t| t == id))
                .unwrap_or(false);
            let in_topic2 = event
                .scope
                .topic_id2
                .as_deref()
                .map(|id| list.iter().any(|t| t == id))
                .unwrap_or(false);
            in_topic || in_topic2
        })
        .unwrap_or(false);

    channel_match || topic_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventScope;

    fn event_with_scope(channel_id: Option<&str>, topic_id: Option<&str>) -> Event {
        Event {
            event_id: 1,
            ts: chrono::Utc::now(),
            name: "message.created".to_string(),
            scope: EventScope {
                channel_id: channel_id.map(str::to_string),
                topic_id: topic_id.map(str::to_string),
                topic_id2: None,
            },
            entity: None,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_subscription_matches_everything() {
        let event = event_with_scope(Some("ch_1"), None);
        assert!(matches_subscription(&event, None, None));
    }

    #[test]
    fn channel_subscription_filters_by_scope() {
        let event = event_with_scope(Some("ch_1"), None);
        assert!(matches_subscription(&event, Some(&["ch_1".to_string()]), Some(&[])));
        assert!(!matches_subscription(&event, Some(&["ch_2".to_string()]), Some(&[])));
    }
}
