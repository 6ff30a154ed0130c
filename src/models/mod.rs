//! Persisted entity shapes and their request/response DTOs.
//!
//! Every row type derives `sqlx::FromRow` for direct query mapping and
//! `serde::Serialize` for the HTTP surface; DTOs live alongside the row they
//! construct or update. Structured JSON columns (`value_json`, `data`) are
//! stored as `TEXT` and converted to `serde_json::Value` at this boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Channel
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelDto {
    pub name: String,
    pub description: Option<String>,
}

// ============================================================================
// Topic
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Topic {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicDto {
    pub channel_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameTopicDto {
    pub title: String,
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: String,
    pub topic_id: String,
    pub channel_id: String,
    pub sender: String,
    pub content_raw: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageDto {
    pub topic_id: String,
    pub sender: String,
    pub content_raw: String,
}

/// The tagged-variant body of `PATCH /api/v1/messages/{id}`, per the
/// re-architecture note replacing ad-hoc `op` string predicates: each
/// variant owns exactly the fields its operation needs.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MessagePatch {
    Edit {
        content_raw: String,
        expected_version: Option<i64>,
    },
    Delete {
        actor: String,
        expected_version: Option<i64>,
    },
    MoveTopic {
        to_topic_id: String,
        mode: MoveMode,
        expected_version: Option<i64>,
        /// Required confirmation for the `all` mode; ignored otherwise.
        #[serde(default)]
        confirm: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoveMode {
    One,
    Later,
    All,
}

// ============================================================================
// Attachment
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub id: String,
    pub topic_id: String,
    pub kind: String,
    pub key: Option<String>,
    pub value_json: String,
    pub dedupe_key: String,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub id: String,
    pub topic_id: String,
    pub kind: String,
    pub key: Option<String>,
    pub value_json: serde_json::Value,
    pub dedupe_key: String,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AttachmentRow> for Attachment {
    type Error = serde_json::Error;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        Ok(Attachment {
            value_json: serde_json::from_str(&row.value_json)?,
            id: row.id,
            topic_id: row.topic_id,
            kind: row.kind,
            key: row.key,
            dedupe_key: row.dedupe_key,
            source_message_id: row.source_message_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentDto {
    pub kind: String,
    pub key: Option<String>,
    pub value_json: serde_json::Value,
    pub dedupe_key: String,
    pub source_message_id: Option<String>,
}

// ============================================================================
// Enrichment
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct EnrichmentRow {
    pub id: String,
    pub message_id: String,
    pub kind: String,
    pub span_start: i64,
    pub span_end: i64,
    pub data: String,
    pub plugin_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrichment {
    pub id: String,
    pub message_id: String,
    pub kind: String,
    pub span_start: i64,
    pub span_end: i64,
    pub data: serde_json::Value,
    pub plugin_name: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EnrichmentRow> for Enrichment {
    type Error = serde_json::Error;

    fn try_from(row: EnrichmentRow) -> Result<Self, Self::Error> {
        Ok(Enrichment {
            data: serde_json::from_str(&row.data)?,
            id: row.id,
            message_id: row.message_id,
            kind: row.kind,
            span_start: row.span_start,
            span_end: row.span_end,
            plugin_name: row.plugin_name,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Event (journal)
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub event_id: i64,
    pub ts: DateTime<Utc>,
    pub name: String,
    pub scope_channel_id: Option<String>,
    pub scope_topic_id: Option<String>,
    pub scope_topic_id2: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub data_json: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id2: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: i64,
    pub ts: DateTime<Utc>,
    pub name: String,
    pub scope: EventScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EventEntity>,
    pub data: serde_json::Value,
}

impl TryFrom<EventRow> for Event {
    type Error = serde_json::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let entity = match (row.entity_type, row.entity_id) {
            (Some(entity_type), Some(id)) => Some(EventEntity { entity_type, id }),
            _ => None,
        };
        Ok(Event {
            event_id: row.event_id,
            ts: row.ts,
            name: row.name,
            scope: EventScope {
                channel_id: row.scope_channel_id,
                topic_id: row.scope_topic_id,
                topic_id2: row.scope_topic_id2,
            },
            entity,
            data: serde_json::from_str(&row.data_json)?,
        })
    }
}

// ============================================================================
// Pagination envelopes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}
