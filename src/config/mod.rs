//! Workspace-relative `hub.toml` config: plugin declarations and limits.
//!
//! Absence of the file is not an error — every field has a default and the
//! daemon runs with zero plugins configured.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Plugin classification per the design: linkifiers annotate a single
/// message with enrichments, extractors derive topic-scoped attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Linkifier,
    Extractor,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path to the plugin's executable, relative to the workspace root.
    /// Validated at load time to stay inside the root.
    pub module: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_message_body_bytes")]
    pub message_body_bytes: usize,
    #[serde(default = "default_config_body_bytes")]
    pub config_body_bytes: usize,
    #[serde(default = "default_global_rps")]
    pub global_requests_per_second: u32,
    #[serde(default = "default_global_burst")]
    pub global_burst: u32,
}

fn default_message_body_bytes() -> usize {
    64 * 1024
}
fn default_config_body_bytes() -> usize {
    16 * 1024
}
fn default_global_rps() -> u32 {
    20
}
fn default_global_burst() -> u32 {
    40
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            message_body_bytes: default_message_body_bytes(),
            config_body_bytes: default_config_body_bytes(),
            global_requests_per_second: default_global_rps(),
            global_burst: default_global_burst(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl WorkspaceConfig {
    /// Load `<root>/hub.toml` if present; otherwise return defaults.
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("hub.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    /// Plugins grouped by kind, enabled only, in declaration order — matches
    /// the dispatch order contract ("ordering between plugins is declaration
    /// order").
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginConfig> {
        self.plugins.iter().filter(|p| p.enabled)
    }
}

/// Process-wide environment overrides. Advisory only — core behavior must
/// not otherwise depend on the environment.
#[derive(Debug, Clone)]
pub struct EnvOverrides {
    pub fts_enabled: bool,
    pub log_filter: Option<String>,
    pub quiet: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self {
            fts_enabled: env.get("HUB_FTS").map(|v| v == "1").unwrap_or(false),
            log_filter: env.get("RUST_LOG").cloned(),
            quiet: env.get("HUB_TEST_QUIET").map(|v| v == "1").unwrap_or(false),
        }
    }
}
