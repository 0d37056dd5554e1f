//! Custom error types and handling
//!
//! This module defines the application's error taxonomy. Backend and store
//! failures are converted to typed results at their own boundary; only plugin
//! failures propagate, because the orchestrator's sole correct response is to
//! mark the session failed and re-raise.

use std::path::PathBuf;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    // Retryable failures
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Resource errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    // Execution errors
    #[error("Execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("Execution infrastructure error: {0}")]
    Infrastructure(String),

    // Persistence errors
    #[error("Corrupt session file {path}: {reason}")]
    SessionCorruption { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // External service errors
    #[error("Docker error: {0}")]
    Docker(String),

    // Plugin errors
    #[error("Plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BenchError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider(_) | Self::Infrastructure(_))
    }
}

impl From<bollard::errors::Error> for BenchError {
    fn from(err: bollard::errors::Error) -> Self {
        BenchError::Docker(err.to_string())
    }
}

impl From<validator::ValidationErrors> for BenchError {
    fn from(err: validator::ValidationErrors) -> Self {
        BenchError::Validation(err.to_string())
    }
}

/// Result type alias using BenchError
pub type BenchResult<T> = Result<T, BenchError>;
