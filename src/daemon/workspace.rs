//! Workspace discovery: locating (or initializing) the `.hub` directory
//! that anchors a running daemon.

use std::path::{Path, PathBuf};

pub const HUB_DIR_NAME: &str = ".hub";
pub const DB_FILE_NAME: &str = "hub.db";
pub const SERVER_FILE_NAME: &str = "server.json";
pub const LOCKS_DIR_NAME: &str = "locks";
pub const WRITER_LOCK_FILE_NAME: &str = "writer.lock";

pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn hub_dir(&self) -> PathBuf {
        self.root.join(HUB_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.hub_dir().join(DB_FILE_NAME)
    }

    pub fn server_json_path(&self) -> PathBuf {
        self.hub_dir().join(SERVER_FILE_NAME)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.hub_dir().join(LOCKS_DIR_NAME)
    }

    pub fn writer_lock_path(&self) -> PathBuf {
        self.locks_dir().join(WRITER_LOCK_FILE_NAME)
    }
}

/// Ascend the filesystem from `start`, looking for an existing
/// `.hub/hub.db`. If none is found in any ancestor, `start` itself becomes
/// the workspace root and its `.hub` directory is created fresh — there
/// would otherwise be no way to ever bootstrap a new workspace.
pub fn discover_or_init(start: &Path) -> std::io::Result<Workspace> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    let mut cursor = Some(start.as_path());
    while let Some(dir) = cursor {
        if dir.join(HUB_DIR_NAME).join(DB_FILE_NAME).is_file() {
            return Ok(Workspace {
                root: dir.to_path_buf(),
            });
        }
        cursor = dir.parent();
    }

    let workspace = Workspace { root: start };
    std::fs::create_dir_all(workspace.locks_dir())?;
    Ok(workspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_existing_hub_dir_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(".hub")).unwrap();
        std::fs::write(root.path().join(".hub").join("hub.db"), b"").unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let workspace = discover_or_init(&nested).unwrap();
        assert_eq!(workspace.root, root.path());
    }

    #[test]
    fn initializes_fresh_workspace_when_none_found() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("fresh");
        std::fs::create_dir_all(&target).unwrap();

        let workspace = discover_or_init(&target).unwrap();
        assert_eq!(workspace.root, target);
        assert!(workspace.locks_dir().is_dir());
    }
}
