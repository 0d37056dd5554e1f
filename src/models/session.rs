//! Session model
//!
//! A session is the durable unit of a resumable benchmark run: configuration
//! snapshot, progress counters and the accumulated per-test-case results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::BackendKind;
use crate::models::result::{TestCaseResult, TestCaseStatus};

/// Lifecycle state of a benchmark session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Immutable snapshot of the inputs a session was created with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model identifiers, in iteration order
    pub models: Vec<String>,
    /// Name of the dataset the session runs against
    pub dataset: String,
    /// Execution backend the session was created with
    pub backend: BackendKind,
    /// Maximum attempts for transient failures
    pub max_retries: u32,
    /// Per-call execution timeout in milliseconds
    pub timeout_ms: u64,
    /// Memory ceiling for sandboxed runs
    pub memory_limit: Option<String>,
}

/// Mutable progress counters for a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionProgress {
    pub total_test_cases: u32,
    pub completed_test_cases: u32,
    pub failed_test_cases: u32,
    pub skipped_test_cases: u32,
    /// Label of the pair currently being processed
    pub current_test_case: Option<String>,
}

impl SessionProgress {
    /// Counted terminal outcomes so far
    pub fn resolved(&self) -> u32 {
        self.completed_test_cases + self.failed_test_cases + self.skipped_test_cases
    }

    /// Whether every test-case instance has a terminal outcome
    pub fn is_complete(&self) -> bool {
        self.resolved() >= self.total_test_cases
    }
}

/// A resumable benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub plugin_name: String,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub progress: SessionProgress,
    pub results: Vec<TestCaseResult>,
    pub start_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    /// Create a new running session with a fresh id
    pub fn new(plugin_name: impl Into<String>, config: SessionConfig, total_test_cases: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            plugin_name: plugin_name.into(),
            status: SessionStatus::Running,
            config,
            progress: SessionProgress {
                total_test_cases,
                ..Default::default()
            },
            results: Vec::new(),
            start_time: now,
            last_update_time: now,
        }
    }

    /// Refresh the last-update timestamp; called by every persist
    pub fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }

    /// Find the recorded result for a (test case, model) pair
    pub fn result_for(&self, test_case_id: &str, model_id: &str) -> Option<&TestCaseResult> {
        self.results
            .iter()
            .find(|r| r.test_case_id == test_case_id && r.model_id == model_id)
    }

    /// Whether a pair already has a completed result and can be skipped on resume
    pub fn is_pair_completed(&self, test_case_id: &str, model_id: &str) -> bool {
        self.result_for(test_case_id, model_id)
            .map(|r| r.status == TestCaseStatus::Completed)
            .unwrap_or(false)
    }

    /// Record a terminal result for a pair, replacing any previous entry.
    ///
    /// A resumed run must overwrite, never duplicate: if the pair already has
    /// an entry its counter bucket is released before the new outcome is
    /// counted, so `completed + failed + skipped <= total` holds across
    /// arbitrary re-runs.
    pub fn record_result(&mut self, result: TestCaseResult) {
        if let Some(existing) = self
            .results
            .iter_mut()
            .find(|r| r.test_case_id == result.test_case_id && r.model_id == result.model_id)
        {
            match existing.status {
                TestCaseStatus::Completed => self.progress.completed_test_cases -= 1,
                TestCaseStatus::Failed => self.progress.failed_test_cases -= 1,
                TestCaseStatus::Skipped => self.progress.skipped_test_cases -= 1,
                TestCaseStatus::Pending | TestCaseStatus::Running => {}
            }
            *existing = result.clone();
        } else {
            self.results.push(result.clone());
        }

        match result.status {
            TestCaseStatus::Completed => self.progress.completed_test_cases += 1,
            TestCaseStatus::Failed => self.progress.failed_test_cases += 1,
            TestCaseStatus::Skipped => self.progress.skipped_test_cases += 1,
            TestCaseStatus::Pending | TestCaseStatus::Running => {}
        }
    }

    /// Whether a failed session still holds progress worth resuming
    pub fn is_resumable(&self) -> bool {
        match self.status {
            SessionStatus::Paused => true,
            SessionStatus::Failed => self.progress.completed_test_cases > 0,
            SessionStatus::Running | SessionStatus::Completed => false,
        }
    }
}
