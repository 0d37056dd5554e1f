//! Execution backends
//!
//! Two implementations share one contract: the process backend spawns a
//! local OS process, the sandbox backend runs code inside a resource-capped,
//! network-isolated container. Both are peers behind `ExecutionEnvironment`,
//! selectable by `BackendKind`.

pub mod archive;
pub mod demux;
pub mod language;
pub mod process;
pub mod sandbox;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::models::{ExecutionRequest, ExecutionResult};

pub use process::ProcessBackend;
pub use sandbox::SandboxBackend;

/// Which execution substrate a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Process,
    Sandbox,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Process => "process",
            BackendKind::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(BackendKind::Process),
            "sandbox" => Ok(BackendKind::Sandbox),
            other => Err(BenchError::InvalidInput(format!(
                "unknown backend '{other}', expected 'process' or 'sandbox'"
            ))),
        }
    }
}

/// Runs one code snippet to completion or timeout.
///
/// Implementations own every temporary resource (process, temp directory,
/// container) for the duration of one call and release it on all paths out.
/// Infrastructure failures surface as a result with `successful == false`
/// and a descriptive `error`; only precondition violations (an unsupported
/// language) are returned as errors, before any resource is created.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Which substrate this backend runs on
    fn kind(&self) -> BackendKind;

    /// Execute the request and report the structured outcome
    async fn run_code(&self, request: ExecutionRequest) -> BenchResult<ExecutionResult>;
}
