//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default directory for session checkpoint files
pub const DEFAULT_SESSIONS_PATH: &str = ".codebench/sessions";

/// Extension used by session checkpoint files
pub const SESSION_FILE_EXTENSION: &str = "json";

// =============================================================================
// EXECUTION DEFAULTS
// =============================================================================

/// Default per-call execution timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default memory limit for sandboxed executions (k/m/g suffixes supported)
pub const DEFAULT_MEMORY_LIMIT: &str = "256m";

/// Default maximum attempts for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Backoff multiplier applied per retry attempt
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;

/// Upper bound for a single backoff delay in milliseconds
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

// =============================================================================
// SANDBOX SETTINGS
// =============================================================================

/// Working directory inside sandbox containers
pub const SANDBOX_WORKSPACE: &str = "/workspace";

/// Maximum number of processes a sandbox may spawn
pub const SANDBOX_PIDS_LIMIT: i64 = 64;

/// Maximum open file descriptors inside a sandbox
pub const SANDBOX_NOFILE_LIMIT: i64 = 256;

/// Writable scratch filesystem mounted at /tmp inside sandboxes
pub const SANDBOX_TMPFS_OPTIONS: &str = "rw,size=16m";

/// Size of one archive block in bytes
pub const ARCHIVE_BLOCK_SIZE: usize = 512;

// =============================================================================
// SUPPORTED LANGUAGES
// =============================================================================

/// Language identifiers
pub mod languages {
    pub const PYTHON: &str = "python";
    pub const JAVASCRIPT: &str = "javascript";
    pub const BASH: &str = "bash";
    pub const RUST: &str = "rust";
    pub const GO: &str = "go";

    /// All supported language identifiers
    pub const ALL: &[&str] = &[PYTHON, JAVASCRIPT, BASH, RUST, GO];
}

/// Container images for each language
pub mod container_images {
    pub const PYTHON: &str = "python:3.12-slim";
    pub const JAVASCRIPT: &str = "node:22-slim";
    pub const BASH: &str = "bash:5.2";
    pub const RUST: &str = "rust:1.82-slim";
    pub const GO: &str = "golang:1.23-alpine";
}
