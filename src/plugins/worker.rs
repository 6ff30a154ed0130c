//! Spawns one plugin invocation as an isolated OS process.
//!
//! The plugin receives only the payload on stdin and returns one JSON array
//! on stdout — no workspace path, database handle, or capability object is
//! passed. The child's working directory is set outside the workspace's
//! hub-private directory so it has no ambient path to write through, which
//! is the defense-in-depth measure described for write isolation; it is not
//! a sandbox guarantee.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, AsyncReadExt};
use tokio::process::Command;

use super::PluginError;

pub async fn invoke(
    module_path: &Path,
    cwd: &Path,
    timeout: Duration,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, PluginError> {
    let mut child = Command::new(module_path)
        .current_dir(cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PluginError::LoadError(e.to_string()))?;

    let stdin_payload = serde_json::to_vec(payload).map_err(|e| PluginError::LoadError(e.to_string()))?;

    let run = async {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&stdin_payload)
                .await
                .map_err(|e| PluginError::WorkerCrash(e.to_string()))?;
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::WorkerCrash("no stdout handle".to_string()))?;
        let mut buf = Vec::new();
        stdout
            .read_to_end(&mut buf)
            .await
            .map_err(|e| PluginError::WorkerCrash(e.to_string()))?;

        let status = child
            .wait()
            .await
            .map_err(|e| PluginError::WorkerCrash(e.to_string()))?;
        if !status.success() {
            return Err(PluginError::WorkerCrash(format!(
                "plugin exited with status {status}"
            )));
        }

        let value: serde_json::Value =
            serde_json::from_slice(&buf).map_err(|e| PluginError::InvalidOutput(e.to_string()))?;
        if !value.is_array() {
            return Err(PluginError::InvalidOutput(
                "plugin output must be a JSON array".to_string(),
            ));
        }
        Ok(value)
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::Timeout),
    }
}
