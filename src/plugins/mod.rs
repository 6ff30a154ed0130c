//! Isolated execution of linkifier/extractor plugins.

mod circuit_breaker;
pub mod pipeline;
mod worker;

pub use pipeline::PluginPipeline;

use thiserror::Error;

/// Plugin-level failure modes. Never surfaced to HTTP clients — only logged
/// and tracked by the circuit breaker.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin timed out")]
    Timeout,
    #[error("plugin worker crashed: {0}")]
    WorkerCrash(String),
    #[error("plugin produced invalid output: {0}")]
    InvalidOutput(String),
    #[error("plugin circuit open")]
    CircuitOpen,
    #[error("failed to load plugin: {0}")]
    LoadError(String),
    #[error("plugin execution error: {0}")]
    ExecutionError(String),
    #[error("plugin attempted to write inside the hub-private directory")]
    IsolationViolation,
}

impl PluginError {
    pub fn code(&self) -> &'static str {
        match self {
            PluginError::Timeout => "TIMEOUT",
            PluginError::WorkerCrash(_) => "WORKER_CRASH",
            PluginError::InvalidOutput(_) => "INVALID_OUTPUT",
            PluginError::CircuitOpen => "CIRCUIT_OPEN",
            PluginError::LoadError(_) => "LOAD_ERROR",
            PluginError::ExecutionError(_) => "EXECUTION_ERROR",
            PluginError::IsolationViolation => "ISOLATION_VIOLATION",
        }
    }
}
