//! Execution backend contract types

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options controlling one code execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Wall-clock timeout in milliseconds; backends apply a default if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Memory ceiling with k/m/g suffix, enforced by the sandbox backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    /// Caller-supplied working directory; implies shared-state intent and
    /// suppresses cleanup in the process backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables merged into the execution environment
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Auxiliary files written next to the main source, path -> content
    #[serde(default)]
    pub files: HashMap<String, String>,
}

/// One code snippet to run to completion or timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub options: ExecutionOptions,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Structured outcome of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    /// Derived: exit code zero and no infrastructure failure
    pub successful: bool,
    pub execution_time_ms: u64,
    /// Present for infrastructure failures (daemon unreachable, timeout),
    /// as opposed to non-zero exit codes, which are legitimate outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Result of a run that reached process/container exit
    pub fn finished(stdout: String, stderr: String, exit_code: i64, execution_time_ms: u64) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            successful: exit_code == 0,
            execution_time_ms,
            error: None,
        }
    }

    /// Result of a run forcibly terminated at its deadline
    pub fn timed_out(stdout: String, stderr: String, timeout_ms: u64) -> Self {
        Self {
            stdout,
            stderr,
            exit_code: -1,
            successful: false,
            execution_time_ms: timeout_ms,
            error: Some(format!("execution timed out after {timeout_ms}ms")),
        }
    }

    /// Result of a run the backend could not perform at all
    pub fn infrastructure_failure(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            successful: false,
            execution_time_ms,
            error: Some(message.into()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.contains("timed out"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_is_derived_from_exit_code() {
        let ok = ExecutionResult::finished("out".into(), String::new(), 0, 12);
        assert!(ok.successful);

        let bad = ExecutionResult::finished(String::new(), "err".into(), 2, 8);
        assert!(!bad.successful);
        assert!(bad.error.is_none());
    }

    #[test]
    fn test_timeout_result_shape() {
        let result = ExecutionResult::timed_out(String::new(), String::new(), 200);
        assert!(!result.successful);
        assert_eq!(result.exit_code, -1);
        assert!(result.is_timeout());
    }
}
