//! Plugin contract
//!
//! A plugin is the strategy object that drives one benchmark: it iterates
//! the (model, test case) cross product, calls the execution backend,
//! records one result per pair and checkpoints the session after each. The
//! orchestrator owns the session lifecycle around it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::backend::ExecutionEnvironment;
use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::error::BenchResult;
use crate::models::{Dataset, Session, TestCaseResult};
use crate::store::SessionStore;

/// Typed per-run configuration with an explicit schema, validated once at
/// session-creation time
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BenchmarkProperties {
    /// Maximum attempts for transient failures
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,
    /// Per-call execution timeout in milliseconds
    #[validate(range(min = 100, max = 3_600_000))]
    pub timeout_ms: u64,
    /// Memory ceiling for sandboxed runs, k/m/g suffixes supported;
    /// format-checked at session creation
    pub memory_limit: Option<String>,
}

impl Default for BenchmarkProperties {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit: None,
        }
    }
}

/// Explicit, passed-in plugin registration map; the orchestrator is
/// constructed with it instead of consulting hidden shared state
pub type PluginRegistry = HashMap<String, Arc<dyn BenchmarkPlugin>>;

/// Strategy object driving one benchmark run
#[async_trait::async_trait]
pub trait BenchmarkPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process every (model, test case) pair, recording one result each and
    /// checkpointing as it goes. Returning an error fails the session;
    /// results checkpointed before the error remain on disk.
    async fn execute(&self, ctx: &mut PluginContext) -> BenchResult<()>;
}

/// Everything a plugin needs for one run
pub struct PluginContext {
    pub models: Vec<String>,
    pub dataset: Dataset,
    pub properties: BenchmarkProperties,
    pub backend: Arc<dyn ExecutionEnvironment>,
    store: Arc<SessionStore>,
    session: Session,
    stop: Arc<AtomicBool>,
}

impl PluginContext {
    pub(crate) fn new(
        models: Vec<String>,
        dataset: Dataset,
        properties: BenchmarkProperties,
        backend: Arc<dyn ExecutionEnvironment>,
        store: Arc<SessionStore>,
        session: Session,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            models,
            dataset,
            properties,
            backend,
            store,
            session,
            stop,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The skip rule lives with the iteration: a pair is skipped iff it
    /// already has a completed result from an earlier run
    pub fn should_skip(&self, test_case_id: &str, model_id: &str) -> bool {
        self.session.is_pair_completed(test_case_id, model_id)
    }

    /// Whether an external stop was requested; checked between test cases
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Update the currently-processed pair label
    pub fn set_current(&mut self, label: impl Into<String>) {
        self.session.progress.current_test_case = Some(label.into());
    }

    /// Record a terminal result and persist the session
    pub async fn record_and_checkpoint(&mut self, result: TestCaseResult) -> BenchResult<()> {
        self.session.record_result(result);
        self.checkpoint().await
    }

    /// Persist the session as it stands
    pub async fn checkpoint(&mut self) -> BenchResult<()> {
        self.session.touch();
        self.store.save(&self.session).await
    }

    pub(crate) fn into_session(self) -> Session {
        self.session
    }
}
