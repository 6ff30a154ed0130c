use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, watch, Mutex};

use crate::config::LimitsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Event, EventRow};
use crate::plugins::PluginPipeline;

/// Channel capacity for the Command-API-to-Stream-hub notification fabric.
/// Sized generously; a connection that falls this far behind is closed with
/// 1008 and told to resume by `event_id`.
pub const BROADCAST_CAPACITY: usize = 4096;

/// Shared application state passed to all handlers and extractors.
///
/// Cloning `AppState` per request is cheap: every field is either `Copy`,
/// an `Arc`, or a handle type that is itself `Arc`-backed (`SqlitePool`,
/// `broadcast::Sender`).
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Serializes all write transactions in-process. Distinct from the
    /// cross-process writer lock file, which serializes whole daemon
    /// instances against the same workspace.
    pub writer: Arc<Mutex<()>>,
    pub broadcast_tx: broadcast::Sender<Event>,
    /// `None` only if the daemon somehow started without generating a
    /// token; mutation handlers then fail every request with
    /// `NO_AUTH_CONFIGURED` rather than silently allowing writes.
    pub auth_token: Option<Arc<str>>,
    pub plugins: Arc<PluginPipeline>,
    pub workspace_root: PathBuf,
    pub limits: LimitsConfig,
    pub instance_id: Arc<str>,
    pub db_id: Arc<str>,
    pub schema_version: i64,
    pub protocol_version: u32,
    /// Whether `db::enable_fts` ran at startup. Checked by the search handler
    /// before querying `messages_fts`, which otherwise doesn't exist.
    pub fts_enabled: bool,
    pub started_at: DateTime<Utc>,
    process_start: Instant,
    shutdown_tx: Arc<watch::Sender<bool>>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        auth_token: Option<String>,
        plugins: PluginPipeline,
        workspace_root: PathBuf,
        limits: LimitsConfig,
        instance_id: String,
        db_id: String,
        schema_version: i64,
        protocol_version: u32,
        fts_enabled: bool,
    ) -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
            broadcast_tx,
            auth_token: auth_token.map(|t| t.into()),
            plugins: Arc::new(plugins),
            workspace_root,
            limits,
            instance_id: instance_id.into(),
            db_id: db_id.into(),
            schema_version,
            protocol_version,
            fts_enabled,
            started_at: Utc::now(),
            process_start: Instant::now(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.process_start.elapsed().as_secs()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Re-read a just-committed event row and publish it on the broadcast
/// channel. Called after every mutating transaction commits, and by the
/// plugin pipeline after its own commits.
///
/// Intentionally non-blocking with respect to the caller beyond one extra
/// `SELECT`: a failure here (e.g. no live subscribers) must never fail the
/// originating mutation, so errors are logged, not propagated.
pub async fn publish_committed_event(
    pool: &SqlitePool,
    broadcast_tx: &broadcast::Sender<Event>,
    event_id: i64,
) -> AppResult<()> {
    let row: EventRow = sqlx::query_as(
        r#"SELECT event_id, ts, name, scope_channel_id, scope_topic_id, scope_topic_id2,
                  entity_type, entity_id, data_json
           FROM events WHERE event_id = ?"#,
    )
    .bind(event_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::Database)?;

    let event: Event = row.try_into().map_err(|_| AppError::Internal)?;
    // No receivers (no live WebSocket connections) is not an error.
    let _ = broadcast_tx.send(event);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_state;

    #[tokio::test]
    async fn begin_shutdown_flips_flag_for_every_clone() {
        let state = test_state().await;
        let clone = state.clone();
        assert!(!state.is_shutting_down());
        state.begin_shutdown();
        assert!(clone.is_shutting_down());
    }
}
