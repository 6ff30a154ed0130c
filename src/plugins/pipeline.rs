//! Dispatches configured plugins after a `message.created`/`message.edited`
//! commit, applies the staleness guard, and commits derived rows.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::config::{PluginConfig, PluginKind};
use crate::ids;
use crate::journal::{self, NewEvent};
use crate::models::{Event, EventScope, Message};
use crate::security;

use super::circuit_breaker::CircuitBreaker;
use super::worker;
use super::PluginError;

/// Snapshot of the fields the staleness guard compares before and after
/// plugin execution.
#[derive(Debug, Clone, PartialEq)]
struct MessageSnapshot {
    version: i64,
    deleted_at: Option<DateTime<Utc>>,
}

pub struct PluginPipeline {
    plugins: Vec<PluginConfig>,
    workspace_root: PathBuf,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl PluginPipeline {
    pub fn new(plugins: Vec<PluginConfig>, workspace_root: PathBuf) -> Self {
        Self {
            plugins,
            workspace_root,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every enabled plugin against `message` in declaration order.
    /// Spawned as a detached task by the caller so it never blocks the
    /// originating HTTP request.
    pub async fn run_for_message(
        self: Arc<Self>,
        pool: SqlitePool,
        writer: Arc<Mutex<()>>,
        broadcast_tx: broadcast::Sender<Event>,
        message: Message,
    ) {
        let snapshot = MessageSnapshot {
            version: message.version,
            deleted_at: message.deleted_at,
        };

        for plugin in &self.plugins {
            if !plugin.enabled {
                continue;
            }

            {
                let breakers = self.breakers.lock().await;
                if breakers
                    .get(&plugin.name)
                    .map(CircuitBreaker::is_open)
                    .unwrap_or(false)
                {
                    let err = PluginError::CircuitOpen;
                    warn!(plugin = %plugin.name, code = err.code(), "{err}, skipping dispatch");
                    continue;
                }
            }

            let outcome = self.invoke_one(plugin, &message).await;

            let mut breakers = self.breakers.lock().await;
            let breaker = breakers.entry(plugin.name.clone()).or_default();
            let output = match outcome {
                Ok(output) => {
                    breaker.record_success();
                    output
                }
                Err(e) => {
                    breaker.record_failure();
                    warn!(plugin = %plugin.name, error = ?e, "plugin invocation failed");
                    continue;
                }
            };
            drop(breakers);

            if let Err(e) = self
                .commit_output(&pool, &writer, &broadcast_tx, plugin, &message, &snapshot, output)
                .await
            {
                warn!(plugin = %plugin.name, error = ?e, "failed to commit plugin output");
            }
        }
    }

    async fn invoke_one(
        &self,
        plugin: &PluginConfig,
        message: &Message,
    ) -> Result<serde_json::Value, PluginError> {
        let module_path = security::validate_workspace_path(
            &self.workspace_root,
            std::path::Path::new(&plugin.module),
        )
        .map_err(PluginError::LoadError)?;

        if module_path.starts_with(self.workspace_root.join(crate::daemon::workspace::HUB_DIR_NAME)) {
            let err = PluginError::IsolationViolation;
            warn!(plugin = %plugin.name, code = err.code(), module = %module_path.display(), "{err}");
            return Err(err);
        }

        let payload = serde_json::json!({
            "message_id": message.id,
            "topic_id": message.topic_id,
            "channel_id": message.channel_id,
            "sender": message.sender,
            "content_raw": message.content_raw,
            "version": message.version,
            "config": plugin.config,
        });

        worker::invoke(
            &module_path,
            &self.workspace_root,
            Duration::from_secs(plugin.timeout_secs),
            &payload,
        )
        .await
    }

    /// Re-reads the message inside a fresh write transaction; if it has
    /// changed since `snapshot`, discards `output` and commits nothing.
    async fn commit_output(
        &self,
        pool: &SqlitePool,
        writer: &Arc<Mutex<()>>,
        broadcast_tx: &broadcast::Sender<Event>,
        plugin: &PluginConfig,
        message: &Message,
        snapshot: &MessageSnapshot,
        output: serde_json::Value,
    ) -> Result<(), PluginError> {
        let items = output
            .as_array()
            .cloned()
            .ok_or_else(|| PluginError::InvalidOutput("expected array".to_string()))?;
        if items.is_empty() {
            return Ok(());
        }

        let _guard = writer.lock().await;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| PluginError::ExecutionError(e.to_string()))?;

        let current: (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT version, deleted_at FROM messages WHERE id = ?",
        )
        .bind(&message.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| PluginError::ExecutionError(e.to_string()))?;

        if current.0 != snapshot.version || current.1 != snapshot.deleted_at {
            info!(message_id = %message.id, plugin = %plugin.name, "message changed during plugin run, discarding output");
            return Ok(());
        }

        let mut emitted_event_id = None;
        match plugin.kind {
            PluginKind::Linkifier => {
                for item in &items {
                    let kind = item
                        .get("kind")
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| PluginError::InvalidOutput("missing kind".to_string()))?;
                    let span = item
                        .get("span")
                        .ok_or_else(|| PluginError::InvalidOutput("missing span".to_string()))?;
                    let start = span.get("start").and_then(|v| v.as_i64()).unwrap_or(0);
                    let end = span.get("end").and_then(|v| v.as_i64()).unwrap_or(start);
                    if end < start || start < 0 {
                        return Err(PluginError::InvalidOutput("invalid span".to_string()));
                    }
                    let data = item.get("data").cloned().unwrap_or(serde_json::Value::Null);
                    let id = ids::new_enrichment_id();

                    sqlx::query(
                        r#"INSERT INTO enrichments
                           (id, message_id, kind, span_start, span_end, data, plugin_name, created_at)
                           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))"#,
                    )
                    .bind(&id)
                    .bind(&message.id)
                    .bind(kind)
                    .bind(start)
                    .bind(end)
                    .bind(serde_json::to_string(&data).map_err(|_| PluginError::InvalidOutput("data not serializable".to_string()))?)
                    .bind(&plugin.name)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| PluginError::ExecutionError(e.to_string()))?;
                }

                let event = NewEvent::new(
                    "message.enriched",
                    EventScope {
                        channel_id: Some(message.channel_id.clone()),
                        topic_id: Some(message.topic_id.clone()),
                        topic_id2: None,
                    },
                    serde_json::json!({ "message_id": message.id, "plugin": plugin.name }),
                )
                .with_entity("message", &message.id);
                emitted_event_id = Some(
                    journal::emit(&mut tx, event)
                        .await
                        .map_err(|e| PluginError::ExecutionError(e.to_string()))?,
                );
            }
            PluginKind::Extractor => {
                for item in &items {
                    let kind = item
                        .get("kind")
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| PluginError::InvalidOutput("missing kind".to_string()))?;
                    let value_json = item
                        .get("value_json")
                        .cloned()
                        .ok_or_else(|| PluginError::InvalidOutput("missing value_json".to_string()))?;
                    let key = item.get("key").and_then(|v| v.as_str()).map(str::to_string);
                    let dedupe_key = item
                        .get("dedupe_key")
                        .and_then(|v| v.as_str())
                        .unwrap_or(kind)
                        .to_string();
                    let id = ids::new_attachment_id();

                    let existing: Option<(String,)> = sqlx::query_as(
                        "SELECT id FROM attachments WHERE topic_id = ? AND kind = ? AND key IS ? AND dedupe_key = ?",
                    )
                    .bind(&message.topic_id)
                    .bind(kind)
                    .bind(&key)
                    .bind(&dedupe_key)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| PluginError::ExecutionError(e.to_string()))?;
                    if existing.is_some() {
                        continue;
                    }

                    sqlx::query(
                        r#"INSERT INTO attachments
                           (id, topic_id, kind, key, value_json, dedupe_key, source_message_id, created_at)
                           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))"#,
                    )
                    .bind(&id)
                    .bind(&message.topic_id)
                    .bind(kind)
                    .bind(&key)
                    .bind(serde_json::to_string(&value_json).map_err(|_| PluginError::InvalidOutput("value_json not serializable".to_string()))?)
                    .bind(&dedupe_key)
                    .bind(&message.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| PluginError::ExecutionError(e.to_string()))?;
                }

                let event = NewEvent::new(
                    "topic.attachment_added",
                    EventScope {
                        channel_id: Some(message.channel_id.clone()),
                        topic_id: Some(message.topic_id.clone()),
                        topic_id2: None,
                    },
                    serde_json::json!({ "message_id": message.id, "plugin": plugin.name }),
                );
                emitted_event_id = Some(
                    journal::emit(&mut tx, event)
                        .await
                        .map_err(|e| PluginError::ExecutionError(e.to_string()))?,
                );
            }
        }

        tx.commit().await.map_err(|e| PluginError::ExecutionError(e.to_string()))?;

        if let Some(event_id) = emitted_event_id {
            let _ = crate::state::publish_committed_event(pool, broadcast_tx, event_id).await;
        }
        Ok(())
    }
}
