//! Application configuration management
//!
//! This module handles loading and validating configuration from environment
//! variables. All configuration is loaded at startup and validated before any
//! benchmark work begins.

use std::env;
use std::path::PathBuf;

use crate::backend::BackendKind;
use crate::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_MEMORY_LIMIT, DEFAULT_SESSIONS_PATH, DEFAULT_TIMEOUT_MS,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub docker: DockerConfig,
    pub execution: ExecutionConfig,
}

/// File storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one checkpoint file per session
    pub sessions_path: PathBuf,
    /// Root under which the process backend creates ephemeral directories
    pub temp_root: PathBuf,
}

/// Docker configuration for sandboxed execution
#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub socket_path: String,
}

/// Execution defaults applied when a session does not override them
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Per-call wall-clock timeout in milliseconds
    pub default_timeout_ms: u64,
    /// Memory ceiling for sandboxed runs, k/m/g suffixes supported
    pub default_memory_limit: String,
    /// Maximum attempts for transient failures
    pub default_max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            storage: StorageConfig::from_env()?,
            docker: DockerConfig::from_env()?,
            execution: ExecutionConfig::from_env()?,
        })
    }

    /// Verify that the environment can support the requested backend.
    ///
    /// Surfaces missing prerequisites before any benchmark work begins: a
    /// writable temp root for the process backend, a reachable Docker socket
    /// for the sandbox backend.
    pub fn validate_for_backend(&self, backend: BackendKind) -> Result<(), ConfigError> {
        match backend {
            BackendKind::Process => {
                if !self.storage.temp_root.is_dir() {
                    return Err(ConfigError::InvalidValue(format!(
                        "temp root {} is not a directory",
                        self.storage.temp_root.display()
                    )));
                }
            }
            BackendKind::Sandbox => {
                if !PathBuf::from(&self.docker.socket_path).exists() {
                    return Err(ConfigError::InvalidValue(format!(
                        "Docker socket {} does not exist",
                        self.docker.socket_path
                    )));
                }
            }
        }
        Ok(())
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            sessions_path: PathBuf::from(
                env::var("CODEBENCH_SESSIONS_PATH")
                    .unwrap_or_else(|_| DEFAULT_SESSIONS_PATH.to_string()),
            ),
            temp_root: env::var("CODEBENCH_TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
        })
    }
}

impl DockerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            socket_path: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| "/var/run/docker.sock".to_string()),
        })
    }
}

impl ExecutionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            default_timeout_ms: env::var("CODEBENCH_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_TIMEOUT_MS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CODEBENCH_TIMEOUT_MS".to_string()))?,
            default_memory_limit: env::var("CODEBENCH_MEMORY_LIMIT")
                .unwrap_or_else(|_| DEFAULT_MEMORY_LIMIT.to_string()),
            default_max_retries: env::var("CODEBENCH_MAX_RETRIES")
                .unwrap_or_else(|_| DEFAULT_MAX_RETRIES.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CODEBENCH_MAX_RETRIES".to_string()))?,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
