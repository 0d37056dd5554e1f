//! Benchmark orchestration
//!
//! The orchestrator drives a plugin across the {models x test cases} cross
//! product, strictly sequentially: the session file is rewritten after each
//! test case, so at most one in-flight outcome can be lost to a crash.

pub mod metrics;
pub mod orchestrator;
pub mod plugin;
pub mod replay;

pub use metrics::{compute_metrics, AggregateMetrics, LatencyStats};
pub use orchestrator::{BenchmarkOrchestrator, BenchmarkReport, ExecuteRequest, StopHandle};
pub use plugin::{BenchmarkPlugin, BenchmarkProperties, PluginContext, PluginRegistry};
pub use replay::ReplayPlugin;
