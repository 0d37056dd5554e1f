//! Test case result models
//!
//! One `TestCaseResult` records the outcome of a single (test case, model)
//! pair. Results become immutable once terminal; completed entries drive the
//! skip logic on resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::execution::ExecutionResult;

/// Lifecycle state of one (test case, model) evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Request sent to a model, kept as an opaque payload owned by the plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub payload: serde_json::Value,
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Response from a model with latency/usage metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub payload: serde_json::Value,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// One named pass/fail check applied to a generated artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    /// Grouping key for quality sub-scores (e.g. "correctness", "format")
    pub kind: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationCheck {
    pub fn passed(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            passed: true,
            message: None,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Outcome of one (test case, model) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case_id: String,
    pub model_id: String,
    pub status: TestCaseStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_request: Option<LlmRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<LlmResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub validation_results: Vec<ValidationCheck>,
    /// Present only when `status == failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestCaseResult {
    /// Create a pending result at the start of one iteration
    pub fn pending(test_case_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            model_id: model_id.into(),
            status: TestCaseStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            llm_request: None,
            llm_response: None,
            execution_result: None,
            validation_results: Vec::new(),
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TestCaseStatus::Running;
    }

    pub fn mark_completed(&mut self) {
        self.finish(TestCaseStatus::Completed);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(TestCaseStatus::Failed);
    }

    pub fn mark_skipped(&mut self) {
        self.finish(TestCaseStatus::Skipped);
    }

    /// Whether every validation check passed
    pub fn all_validations_passed(&self) -> bool {
        self.validation_results.iter().all(|v| v.passed)
    }

    fn finish(&mut self, status: TestCaseStatus) {
        let now = Utc::now();
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.finished_at = Some(now);
        self.status = status;
    }
}
