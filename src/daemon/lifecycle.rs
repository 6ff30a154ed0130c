//! Writer-lock acquisition with stale-lock reclaim, and `server.json`
//! publication, following the exclusive-lock-file-plus-PID pattern common
//! to single-instance daemons, adapted here to a liveness probe rather than
//! an `flock` held for the process lifetime (so a crashed daemon's lock is
//! reclaimable without relying on OS lock release semantics across a
//! container boundary).

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::daemon::workspace::Workspace;

const MAX_RECLAIM_ATTEMPTS: u32 = 5;
const RECLAIM_BACKOFF: Duration = Duration::from_millis(100);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("writer lock held by a live daemon instance")]
    LockHeld,
    #[error("io error acquiring writer lock: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the writer lock for the life of the process. Dropping it does
/// NOT remove the lock file — that is done explicitly during graceful
/// shutdown, matching spec wording that lock removal is one of the final,
/// idempotent shutdown steps rather than a `Drop`-driven side effect.
pub struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    /// Attempt exclusive create; on conflict, probe the existing holder's
    /// `/health` endpoint via `server.json`. A non-matching or unreachable
    /// holder is considered stale and the lock file is removed and retried.
    pub async fn acquire(workspace: &Workspace) -> Result<Self, LockError> {
        let path = workspace.writer_lock_path();
        std::fs::create_dir_all(workspace.locks_dir())?;

        for attempt in 0..MAX_RECLAIM_ATTEMPTS {
            match try_create(&path) {
                Ok(()) => return Ok(WriterLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_holder_live(workspace).await {
                        return Err(LockError::LockHeld);
                    }
                    warn!(attempt, "reclaiming stale writer lock");
                    let _ = std::fs::remove_file(&path);
                    tokio::time::sleep(RECLAIM_BACKOFF).await;
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
        Err(LockError::LockHeld)
    }

    pub fn release(self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let contents = format!("{}\n{}", std::process::id(), Utc::now().to_rfc3339());
    file.write_all(contents.as_bytes())
}

async fn is_holder_live(workspace: &Workspace) -> bool {
    let Ok(info) = read_server_json(&workspace.server_json_path()) else {
        return false;
    };
    let client = match reqwest::Client::builder().timeout(HEALTH_PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(_) => return false,
    };
    let url = format!("http://{}:{}/health", info.host, info.port);
    match client.get(&url).send().await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => body.get("instance_id").and_then(|v| v.as_str()) == Some(info.instance_id.as_str()),
            Err(_) => false,
        },
        Err(_) => false,
    }
}

/// The published discovery document. Contains the auth token — this file
/// MUST be mode 0600 and MUST NOT be logged in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub instance_id: String,
    pub db_id: String,
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub auth_token: String,
    pub started_at: DateTime<Utc>,
    pub protocol_version: u32,
    pub schema_version: i64,
}

/// Write `server.json` atomically: serialize to a same-directory temp file,
/// set mode 0600, then rename into place.
pub fn publish_server_json(workspace: &Workspace, info: &ServerInfo) -> std::io::Result<()> {
    let final_path = workspace.server_json_path();
    let tmp_path = workspace.hub_dir().join("server.json.tmp");
    std::fs::create_dir_all(workspace.hub_dir())?;

    let body = serde_json::to_string_pretty(info)?;
    std::fs::write(&tmp_path, body)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, &final_path)?;
    info!(path = %final_path.display(), "published server.json");
    Ok(())
}

/// Idempotent: missing file is not an error.
pub fn remove_server_json(workspace: &Workspace) -> std::io::Result<()> {
    match std::fs::remove_file(workspace.server_json_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn read_server_json(path: &Path) -> std::io::Result<ServerInfo> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
