//! Test-only helpers for building a throwaway `AppState` backed by a
//! temporary SQLite database. Not compiled into release builds.

use std::path::PathBuf;

use crate::config::LimitsConfig;
use crate::db;
use crate::plugins::PluginPipeline;
use crate::state::AppState;

/// An in-memory-equivalent hub database (a tempdir-backed file, since sqlx's
/// migration runner and WAL mode both want a real path) with a fresh
/// `AppState` and no plugins configured.
pub async fn test_state() -> AppState {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path: PathBuf = dir.path().join("hub.db");
    let pool = db::create_pool(&db_path).await.expect("create pool");
    // Leak the tempdir for the lifetime of the test process; tests are
    // short-lived and this avoids lifetime gymnastics around AppState.
    std::mem::forget(dir);

    AppState::new(
        pool,
        Some("test-token".to_string()),
        PluginPipeline::new(Vec::new(), db_path.parent().unwrap().to_path_buf()),
        db_path.parent().unwrap().to_path_buf(),
        LimitsConfig::default(),
        "test-instance".to_string(),
        "test-db".to_string(),
        1,
        1,
        false,
    )
}

/// Same as [`test_state`] but with the full-text-search index enabled, for
/// tests covering `message::search`.
pub async fn test_state_with_fts() -> AppState {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path: PathBuf = dir.path().join("hub.db");
    let pool = db::create_pool(&db_path).await.expect("create pool");
    db::enable_fts(&pool).await.expect("enable fts");
    std::mem::forget(dir);

    AppState::new(
        pool,
        Some("test-token".to_string()),
        PluginPipeline::new(Vec::new(), db_path.parent().unwrap().to_path_buf()),
        db_path.parent().unwrap().to_path_buf(),
        LimitsConfig::default(),
        "test-instance".to_string(),
        "test-db".to_string(),
        1,
        1,
        true,
    )
}
