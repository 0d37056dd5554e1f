//! Command-line interface
//!
//! Thin layer mapping subcommands onto orchestrator and store calls. Exit
//! code 0 on success, non-zero on any unrecovered failure (via the error
//! returned to `main`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::backend::{BackendKind, ExecutionEnvironment, ProcessBackend, SandboxBackend};
use crate::bench::{
    BenchmarkOrchestrator, BenchmarkProperties, BenchmarkReport, ExecuteRequest, PluginRegistry,
    ReplayPlugin,
};
use crate::config::Config;
use crate::models::{Dataset, Session};
use crate::store::SessionStore;
use crate::utils::time::{format_duration, format_milliseconds, now_utc};

#[derive(Parser)]
#[command(name = "codebench", version, about = "Resumable benchmarks for model-generated code")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark, creating a new session
    Run {
        /// Plugin driving the benchmark
        #[arg(long, default_value = "replay")]
        plugin: String,
        /// Model identifiers, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<String>,
        /// Path to the dataset JSON file
        #[arg(long)]
        dataset: PathBuf,
        /// Execution backend: process or sandbox
        #[arg(long, default_value = "process")]
        backend: String,
        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Maximum attempts for transient failures
        #[arg(long)]
        max_retries: Option<u32>,
        /// Memory limit for sandboxed runs (k/m/g suffixes)
        #[arg(long)]
        memory_limit: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resume a paused or failed session by id
    Continue {
        session_id: String,
        /// Path to the dataset JSON file the session was created with
        #[arg(long)]
        dataset: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all stored sessions
    ListSessions,
    /// Show one session in detail
    ShowSession {
        session_id: String,
        /// Print the full session as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Dispatch a parsed command line
pub async fn execute(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            plugin,
            models,
            dataset,
            backend,
            timeout_ms,
            max_retries,
            memory_limit,
            json,
        } => {
            let backend_kind: BackendKind = backend.parse()?;
            config.validate_for_backend(backend_kind)?;

            let properties = BenchmarkProperties {
                max_retries: max_retries.unwrap_or(config.execution.default_max_retries),
                timeout_ms: timeout_ms.unwrap_or(config.execution.default_timeout_ms),
                memory_limit: memory_limit
                    .or_else(|| Some(config.execution.default_memory_limit.clone())),
            };

            let dataset = Dataset::load(&dataset).await?;
            let store = initialize_store(&config).await?;
            let backend = build_backend(&config, backend_kind, &properties).await?;
            let orchestrator = BenchmarkOrchestrator::new(store, registry());
            wire_ctrl_c(&orchestrator);

            let report = orchestrator
                .execute_benchmark(ExecuteRequest {
                    plugin_name: plugin,
                    models,
                    dataset,
                    backend,
                    properties,
                    session_id: None,
                })
                .await?;
            print_report(&report, json)?;
            Ok(())
        }
        Commands::Continue {
            session_id,
            dataset,
            json,
        } => {
            let store = initialize_store(&config).await?;
            let session = store
                .load(&session_id)
                .await?
                .with_context(|| format!("session '{session_id}' not found"))?;

            let backend_kind = session.config.backend;
            config.validate_for_backend(backend_kind)?;

            let properties = BenchmarkProperties {
                max_retries: session.config.max_retries,
                timeout_ms: session.config.timeout_ms,
                memory_limit: session.config.memory_limit.clone(),
            };

            let dataset = Dataset::load(&dataset).await?;
            let backend = build_backend(&config, backend_kind, &properties).await?;
            let orchestrator = BenchmarkOrchestrator::new(store, registry());
            wire_ctrl_c(&orchestrator);

            let report = orchestrator
                .execute_benchmark(ExecuteRequest {
                    plugin_name: session.plugin_name.clone(),
                    models: session.config.models.clone(),
                    dataset,
                    backend,
                    properties,
                    session_id: Some(session_id),
                })
                .await?;
            print_report(&report, json)?;
            Ok(())
        }
        Commands::ListSessions => {
            let store = initialize_store(&config).await?;
            let sessions = store.list().await?;
            if sessions.is_empty() {
                println!("no sessions found");
                return Ok(());
            }
            println!(
                "{:<38} {:<10} {:<10} {:>12} {:>10}",
                "SESSION", "PLUGIN", "STATUS", "PROGRESS", "AGE"
            );
            for session in sessions {
                print_session_row(&session);
            }
            Ok(())
        }
        Commands::ShowSession { session_id, json } => {
            let store = initialize_store(&config).await?;
            let session = store
                .load(&session_id)
                .await?
                .with_context(|| format!("session '{session_id}' not found"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_session_detail(&session);
            }
            Ok(())
        }
    }
}

fn registry() -> PluginRegistry {
    let mut plugins: PluginRegistry = HashMap::new();
    plugins.insert("replay".to_string(), Arc::new(ReplayPlugin));
    plugins
}

async fn initialize_store(config: &Config) -> anyhow::Result<Arc<SessionStore>> {
    let store = Arc::new(SessionStore::new(config.storage.sessions_path.clone()));
    store.initialize().await?;
    Ok(store)
}

async fn build_backend(
    config: &Config,
    kind: BackendKind,
    properties: &BenchmarkProperties,
) -> anyhow::Result<Arc<dyn ExecutionEnvironment>> {
    match kind {
        BackendKind::Process => Ok(Arc::new(
            ProcessBackend::new(config.storage.temp_root.clone())
                .with_default_timeout(properties.timeout_ms),
        )),
        BackendKind::Sandbox => {
            let backend = SandboxBackend::connect(&config.docker)
                .await
                .context("sandbox backend requires a reachable Docker daemon")?;
            let memory_limit = properties
                .memory_limit
                .clone()
                .unwrap_or_else(|| config.execution.default_memory_limit.clone());
            Ok(Arc::new(
                backend.with_defaults(properties.timeout_ms, memory_limit),
            ))
        }
    }
}

/// Ctrl-c stops the session after the in-flight test case
fn wire_ctrl_c(orchestrator: &BenchmarkOrchestrator) {
    let handle = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, pausing after the current test case");
            handle.request_stop();
        }
    });
}

fn print_report(report: &BenchmarkReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "session {} {}",
        report.session_id,
        report.status.as_str()
    );
    let m = &report.metrics;
    println!(
        "  test cases: {} completed, {} failed, {} skipped of {}",
        m.completed_test_cases, m.failed_test_cases, m.skipped_test_cases, m.total_test_cases
    );
    println!("  success rate: {:.1}%", m.success_rate * 100.0);
    println!(
        "  latency: mean {} / median {} / p95 {} / p99 {}",
        format_milliseconds(m.latency.mean_ms as u64),
        format_milliseconds(m.latency.median_ms as u64),
        format_milliseconds(m.latency.p95_ms as u64),
        format_milliseconds(m.latency.p99_ms as u64),
    );
    for (kind, score) in &m.quality {
        println!("  quality[{kind}]: {:.1}%", score * 100.0);
    }
    Ok(())
}

fn print_session_row(session: &Session) {
    let age = now_utc() - session.start_time;
    println!(
        "{:<38} {:<10} {:<10} {:>9}/{:<3} {:>10}",
        session.id,
        session.plugin_name,
        session.status.as_str(),
        session.progress.resolved(),
        session.progress.total_test_cases,
        format_duration(age),
    );
}

fn print_session_detail(session: &Session) {
    println!("session:  {}", session.id);
    println!("plugin:   {}", session.plugin_name);
    println!("status:   {}", session.status.as_str());
    println!("backend:  {}", session.config.backend);
    println!("dataset:  {}", session.config.dataset);
    println!("models:   {}", session.config.models.join(", "));
    println!(
        "progress: {}/{} ({} failed, {} skipped)",
        session.progress.completed_test_cases,
        session.progress.total_test_cases,
        session.progress.failed_test_cases,
        session.progress.skipped_test_cases,
    );
    if let Some(current) = &session.progress.current_test_case {
        println!("current:  {current}");
    }
    println!("started:  {}", session.start_time.to_rfc3339());
    println!("updated:  {}", session.last_update_time.to_rfc3339());

    if !session.results.is_empty() {
        println!();
        println!(
            "{:<20} {:<12} {:<10} {:>10} {:<8}",
            "TEST CASE", "MODEL", "STATUS", "DURATION", "CHECKS"
        );
        for result in &session.results {
            let duration = result
                .duration_ms
                .map(format_milliseconds)
                .unwrap_or_else(|| "-".to_string());
            let passed = result
                .validation_results
                .iter()
                .filter(|v| v.passed)
                .count();
            println!(
                "{:<20} {:<12} {:<10} {:>10} {:<8}",
                result.test_case_id,
                result.model_id,
                format!("{:?}", result.status).to_lowercase(),
                duration,
                format!("{passed}/{}", result.validation_results.len()),
            );
        }
    }
}
