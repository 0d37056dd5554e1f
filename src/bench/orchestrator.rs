//! Benchmark orchestrator
//!
//! Owns the session lifecycle: creation, resume, plugin invocation, final
//! status transitions and aggregate metrics. The orchestrator is constructed
//! with an explicit plugin registry; there is no global registration state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::backend::{BackendKind, ExecutionEnvironment};
use crate::bench::metrics::{compute_metrics, AggregateMetrics};
use crate::bench::plugin::{BenchmarkProperties, PluginContext, PluginRegistry};
use crate::error::{BenchError, BenchResult};
use crate::models::{Dataset, Session, SessionConfig, SessionStatus};
use crate::store::SessionStore;
use crate::utils::validation::validate_models;

/// One benchmark invocation
pub struct ExecuteRequest {
    pub plugin_name: String,
    pub models: Vec<String>,
    pub dataset: Dataset,
    pub backend: Arc<dyn ExecutionEnvironment>,
    pub properties: BenchmarkProperties,
    /// Resume this session instead of creating a new one
    pub session_id: Option<String>,
}

/// Final outcome returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub metrics: AggregateMetrics,
}

/// Requests that no further test case be started.
///
/// A stop cannot recall a dispatched execution; the in-flight pair finishes
/// and the session is left paused for a later resume.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Drives plugins across the {models x test cases} cross product
pub struct BenchmarkOrchestrator {
    store: Arc<SessionStore>,
    plugins: PluginRegistry,
    stop: Arc<AtomicBool>,
}

impl BenchmarkOrchestrator {
    /// Build an orchestrator around a store and an explicit plugin registry
    pub fn new(store: Arc<SessionStore>, plugins: PluginRegistry) -> Self {
        Self {
            store,
            plugins,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Create and persist a new running session
    pub async fn create_session(
        &self,
        plugin_name: &str,
        models: Vec<String>,
        dataset: &Dataset,
        properties: &BenchmarkProperties,
        backend: BackendKind,
    ) -> BenchResult<Session> {
        if !self.plugins.contains_key(plugin_name) {
            return Err(BenchError::NotFound(format!("plugin '{plugin_name}'")));
        }
        validate_models(&models)?;
        properties.validate()?;
        if let Some(limit) = &properties.memory_limit {
            crate::backend::sandbox::parse_memory_limit(limit)?;
        }

        let total = (models.len() * dataset.test_cases.len()) as u32;
        let session = Session::new(
            plugin_name,
            SessionConfig {
                models,
                dataset: dataset.name.clone(),
                backend,
                max_retries: properties.max_retries,
                timeout_ms: properties.timeout_ms,
                memory_limit: properties.memory_limit.clone(),
            },
            total,
        );
        self.store.save(&session).await?;

        tracing::info!(
            session_id = %session.id,
            plugin = plugin_name,
            total_test_cases = total,
            "created benchmark session"
        );
        Ok(session)
    }

    /// Run (or resume) a benchmark session to its next terminal state.
    ///
    /// On plugin failure the session is marked failed and the error
    /// re-raised; results checkpointed before the failure remain on disk,
    /// which is what makes a later resume useful.
    pub async fn execute_benchmark(&self, request: ExecuteRequest) -> BenchResult<BenchmarkReport> {
        let plugin = self
            .plugins
            .get(&request.plugin_name)
            .cloned()
            .ok_or_else(|| BenchError::NotFound(format!("plugin '{}'", request.plugin_name)))?;

        let mut session = match &request.session_id {
            Some(id) => self.resume_session(id, &request).await?,
            None => {
                self.create_session(
                    &request.plugin_name,
                    request.models.clone(),
                    &request.dataset,
                    &request.properties,
                    request.backend.kind(),
                )
                .await?
            }
        };

        // The session's config snapshot is authoritative for iteration order
        // and limits, so a resume cannot drift from the original run
        let models = session.config.models.clone();
        let properties = BenchmarkProperties {
            max_retries: session.config.max_retries,
            timeout_ms: session.config.timeout_ms,
            memory_limit: session.config.memory_limit.clone(),
        };

        session.status = SessionStatus::Running;
        session.touch();
        self.store.save(&session).await?;

        let session_id = session.id.clone();
        let mut ctx = PluginContext::new(
            models,
            request.dataset,
            properties,
            request.backend,
            Arc::clone(&self.store),
            session,
            Arc::clone(&self.stop),
        );

        let outcome = plugin.execute(&mut ctx).await;
        let mut session = ctx.into_session();
        session.progress.current_test_case = None;

        match outcome {
            Ok(()) => {
                session.status =
                    if self.stop.load(Ordering::Relaxed) && !session.progress.is_complete() {
                        SessionStatus::Paused
                    } else {
                        SessionStatus::Completed
                    };
                session.touch();
                self.store.save(&session).await?;

                let metrics = compute_metrics(&session);
                tracing::info!(
                    session_id = %session.id,
                    status = session.status.as_str(),
                    success_rate = metrics.success_rate,
                    "benchmark finished"
                );
                Ok(BenchmarkReport {
                    session_id: session.id,
                    status: session.status,
                    metrics,
                })
            }
            Err(e) => {
                session.status = SessionStatus::Failed;
                session.touch();
                if let Err(save_err) = self.store.save(&session).await {
                    tracing::error!(
                        session_id = %session_id,
                        "failed to persist failed session: {save_err}"
                    );
                }
                Err(BenchError::Plugin {
                    plugin: request.plugin_name,
                    source: anyhow::Error::new(e),
                })
            }
        }
    }

    /// Load a session for resumption, verifying it matches the request
    async fn resume_session(&self, id: &str, request: &ExecuteRequest) -> BenchResult<Session> {
        let session = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| BenchError::NotFound(format!("session '{id}'")))?;

        if session.plugin_name != request.plugin_name {
            return Err(BenchError::Validation(format!(
                "session '{id}' was created by plugin '{}', not '{}'",
                session.plugin_name, request.plugin_name
            )));
        }
        // A resume must use the originally configured backend; switching
        // substrates mid-session is rejected rather than merged
        if session.config.backend != request.backend.kind() {
            return Err(BenchError::Validation(format!(
                "session '{id}' was created with the {} backend and cannot resume on {}",
                session.config.backend,
                request.backend.kind()
            )));
        }
        if session.config.dataset != request.dataset.name {
            return Err(BenchError::Validation(format!(
                "session '{id}' ran dataset '{}', not '{}'",
                session.config.dataset, request.dataset.name
            )));
        }

        tracing::info!(
            session_id = %id,
            completed = session.progress.completed_test_cases,
            total = session.progress.total_test_cases,
            "resuming benchmark session"
        );
        Ok(session)
    }

    /// Enumerate all persisted sessions
    pub async fn list_sessions(&self) -> BenchResult<Vec<Session>> {
        self.store.list().await
    }

    /// Fetch one session by id
    pub async fn get_session(&self, id: &str) -> BenchResult<Option<Session>> {
        self.store.load(id).await
    }
}
