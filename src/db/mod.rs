//! SQLite pool setup: WAL mode, busy timeout, and the migration runner.
//!
//! Reads are served from the pool directly (WAL allows concurrent readers).
//! Writes are not serialized here — see `AppState`'s writer mutex, which
//! guards the append-to-journal path so every commit is strictly ordered.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::ids;

/// Bumped whenever a migration changes the on-disk schema in a way clients
/// of `/health` should be able to observe.
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if absent) the hub database at `<workspace>/.hub/hub.db`
/// and bring its schema up to date.
pub async fn create_pool(db_path: &Path) -> AppResult<SqlitePool> {
    info!(path = %db_path.display(), "opening hub database");

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .map_err(AppError::Database)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(AppError::Database)?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("hub database ready");
    Ok(pool)
}

/// Apply the opt-in full-text-search schema. Safe to call unconditionally;
/// the migration's own `CREATE VIRTUAL TABLE IF NOT EXISTS` guards it.
pub async fn enable_fts(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations_fts").run(pool).await?;
    Ok(())
}

/// Read `meta.db_id`, assigning a fresh one on first initialization.
pub async fn get_or_create_db_id(pool: &SqlitePool) -> AppResult<String> {
    if let Some((value,)) = sqlx::query_as::<_, (String,)>("SELECT value FROM meta WHERE key = 'db_id'")
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
    {
        return Ok(value);
    }

    let db_id = ids::new_db_id();
    sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('db_id', ?)")
        .bind(&db_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

    // Another connection may have raced us; the canonical value is whatever
    // landed first.
    let (value,): (String,) = sqlx::query_as("SELECT value FROM meta WHERE key = 'db_id'")
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
    Ok(value)
}

pub async fn health_check(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn db_id_is_assigned_once_and_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("hub.db")).await.unwrap();

        let first = get_or_create_db_id(&pool).await.unwrap();
        let second = get_or_create_db_id(&pool).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("db_"));
    }
}
