//! Replay evaluation plugin
//!
//! Evaluates pre-generated candidate code attached to the dataset: each
//! (model, test case) pair resolves to a candidate (per-model response or
//! shared source), runs it through the configured backend and grades the
//! outcome with exit-status and output-match checks. No live model call is
//! made, which keeps the engine independent of any provider integration.

use std::sync::Arc;

use crate::bench::plugin::{BenchmarkPlugin, PluginContext};
use crate::error::{BenchError, BenchResult};
use crate::models::{
    ExecutionOptions, ExecutionRequest, TestCase, TestCaseResult, ValidationCheck,
};
use crate::utils::retry::{exhausted, retry_with_backoff, RetryPolicy};

/// Plugin evaluating pre-generated candidate code
#[derive(Debug, Default)]
pub struct ReplayPlugin;

#[async_trait::async_trait]
impl BenchmarkPlugin for ReplayPlugin {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn execute(&self, ctx: &mut PluginContext) -> BenchResult<()> {
        let policy = RetryPolicy::with_max_attempts(ctx.properties.max_retries);
        let models = ctx.models.clone();
        let test_cases = ctx.dataset.test_cases.clone();

        for model in &models {
            for test_case in &test_cases {
                if ctx.stop_requested() {
                    tracing::info!(
                        session_id = %ctx.session().id,
                        "stop requested, leaving remaining test cases for resume"
                    );
                    return Ok(());
                }
                if ctx.should_skip(&test_case.id, model) {
                    tracing::debug!(
                        test_case = %test_case.id,
                        model = %model,
                        "already completed, skipping"
                    );
                    continue;
                }

                ctx.set_current(format!("{}/{}", test_case.id, model));
                let result = self.evaluate_pair(ctx, test_case, model, &policy).await;
                ctx.record_and_checkpoint(result).await?;
            }
        }
        Ok(())
    }
}

impl ReplayPlugin {
    async fn evaluate_pair(
        &self,
        ctx: &PluginContext,
        test_case: &TestCase,
        model: &str,
        policy: &RetryPolicy,
    ) -> TestCaseResult {
        let mut result = TestCaseResult::pending(&test_case.id, model);
        result.mark_running();

        let Some(candidate) = test_case.candidate_for(model) else {
            tracing::warn!(
                test_case = %test_case.id,
                model = %model,
                "no candidate code for pair, skipping"
            );
            result.mark_skipped();
            return result;
        };

        let request = ExecutionRequest::new(candidate, &test_case.language).with_options(
            ExecutionOptions {
                timeout_ms: Some(ctx.properties.timeout_ms),
                memory_limit: ctx.properties.memory_limit.clone(),
                files: test_case.files.clone(),
                ..Default::default()
            },
        );

        let backend = Arc::clone(&ctx.backend);
        let outcome = retry_with_backoff(policy, "code execution", || {
            let request = request.clone();
            let backend = Arc::clone(&backend);
            async move {
                let execution = backend.run_code(request).await?;
                // A timeout is a legitimate outcome; any other infrastructure
                // failure is worth another attempt
                match &execution.error {
                    Some(error) if !execution.is_timeout() => {
                        Err(BenchError::Infrastructure(error.clone()))
                    }
                    _ => Ok(execution),
                }
            }
        })
        .await;

        match outcome {
            Ok(execution) => {
                if execution.successful {
                    result
                        .validation_results
                        .push(ValidationCheck::passed("exit-status", "correctness"));
                } else {
                    result.validation_results.push(ValidationCheck::failed(
                        "exit-status",
                        "correctness",
                        execution
                            .error
                            .clone()
                            .unwrap_or_else(|| format!("exit code {}", execution.exit_code)),
                    ));
                }

                if let Some(expected) = &test_case.expected_output {
                    if outputs_match(&execution.stdout, expected) {
                        result
                            .validation_results
                            .push(ValidationCheck::passed("output-match", "correctness"));
                    } else {
                        result.validation_results.push(ValidationCheck::failed(
                            "output-match",
                            "correctness",
                            "stdout does not match expected output",
                        ));
                    }
                }

                result.execution_result = Some(execution);
                result.mark_completed();
            }
            Err(e) => {
                result.mark_failed(exhausted(&e, policy));
            }
        }
        result
    }
}

/// Compare outputs with trimmed, newline-normalized equality
fn outputs_match(actual: &str, expected: &str) -> bool {
    let actual = actual.trim().replace("\r\n", "\n");
    let expected = expected.trim().replace("\r\n", "\n");
    actual == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, MockExecutionEnvironment};
    use crate::bench::plugin::BenchmarkProperties;
    use crate::models::{Dataset, ExecutionResult, Session, SessionConfig, TestCaseStatus};
    use crate::store::SessionStore;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    fn test_case(id: &str, source: Option<&str>, expected: Option<&str>) -> TestCase {
        TestCase {
            id: id.to_string(),
            name: None,
            prompt: "task".to_string(),
            language: "bash".to_string(),
            source: source.map(str::to_string),
            responses: HashMap::new(),
            expected_output: expected.map(str::to_string),
            files: HashMap::new(),
        }
    }

    async fn context_with_backend(
        backend: MockExecutionEnvironment,
        dataset: Dataset,
        models: Vec<String>,
        dir: &std::path::Path,
    ) -> PluginContext {
        let store = Arc::new(SessionStore::new(dir));
        store.initialize().await.unwrap();
        let total = (models.len() * dataset.test_cases.len()) as u32;
        let session = Session::new(
            "replay",
            SessionConfig {
                models: models.clone(),
                dataset: dataset.name.clone(),
                backend: BackendKind::Process,
                max_retries: 2,
                timeout_ms: 5_000,
                memory_limit: None,
            },
            total,
        );
        store.save(&session).await.unwrap();
        PluginContext::new(
            models,
            dataset,
            BenchmarkProperties {
                max_retries: 2,
                timeout_ms: 5_000,
                memory_limit: None,
            },
            Arc::new(backend),
            store,
            session,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_outputs_match_normalizes_whitespace() {
        assert!(outputs_match("hello\r\nworld\n", "hello\nworld"));
        assert!(outputs_match("  42  ", "42"));
        assert!(!outputs_match("41", "42"));
    }

    #[tokio::test]
    async fn test_successful_pair_records_green_validations() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockExecutionEnvironment::new();
        backend
            .expect_run_code()
            .times(1)
            .returning(|_| Ok(ExecutionResult::finished("42\n".into(), String::new(), 0, 7)));

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1", Some("echo 42"), Some("42"))],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        assert_eq!(session.progress.completed_test_cases, 1);
        let result = session.result_for("t1", "m1").unwrap();
        assert_eq!(result.status, TestCaseStatus::Completed);
        assert!(result.all_validations_passed());
        assert!(result.execution_result.as_ref().unwrap().successful);
    }

    #[tokio::test]
    async fn test_output_mismatch_completes_with_failed_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockExecutionEnvironment::new();
        backend
            .expect_run_code()
            .times(1)
            .returning(|_| Ok(ExecutionResult::finished("41\n".into(), String::new(), 0, 5)));

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1", Some("echo 41"), Some("42"))],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        let result = session.result_for("t1", "m1").unwrap();
        assert_eq!(result.status, TestCaseStatus::Completed);
        assert!(!result.all_validations_passed());
    }

    #[tokio::test]
    async fn test_infrastructure_failures_retried_then_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockExecutionEnvironment::new();
        backend.expect_run_code().times(2).returning(|_| {
            Ok(ExecutionResult::infrastructure_failure(
                "daemon unreachable",
                0,
            ))
        });

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1", Some("echo hi"), None)],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        let result = session.result_for("t1", "m1").unwrap();
        assert_eq!(result.status, TestCaseStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("daemon unreachable"));
    }

    #[tokio::test]
    async fn test_timeout_completes_pair_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockExecutionEnvironment::new();
        backend
            .expect_run_code()
            .times(1)
            .returning(|_| Ok(ExecutionResult::timed_out(String::new(), String::new(), 200)));

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1", Some("sleep 30"), None)],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        let result = session.result_for("t1", "m1").unwrap();
        assert_eq!(result.status, TestCaseStatus::Completed);
        assert!(!result.all_validations_passed());
    }

    #[tokio::test]
    async fn test_missing_candidate_marks_pair_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockExecutionEnvironment::new();

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1", None, None)],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        assert_eq!(session.progress.skipped_test_cases, 1);
        let result = session.result_for("t1", "m1").unwrap();
        assert_eq!(result.status, TestCaseStatus::Skipped);
    }

    #[tokio::test]
    async fn test_completed_pairs_skipped_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockExecutionEnvironment::new();
        // Only t2 runs; t1 already has a completed result
        backend
            .expect_run_code()
            .times(1)
            .returning(|_| Ok(ExecutionResult::finished("ok\n".into(), String::new(), 0, 3)));

        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![
                test_case("t1", Some("echo ok"), None),
                test_case("t2", Some("echo ok"), None),
            ],
        };
        let mut ctx =
            context_with_backend(backend, dataset, vec!["m1".to_string()], dir.path()).await;

        let mut done = TestCaseResult::pending("t1", "m1");
        done.mark_completed();
        ctx.record_and_checkpoint(done).await.unwrap();

        ReplayPlugin.execute(&mut ctx).await.unwrap();

        let session = ctx.into_session();
        assert_eq!(session.progress.completed_test_cases, 2);
        assert_eq!(session.results.len(), 2);
    }
}
