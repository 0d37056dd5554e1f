//! CodeBench - Resumable Code-Benchmark Execution Engine
//!
//! This library evaluates how well language models perform code-editing
//! tasks: generated code is dispatched to an execution backend and the
//! result graded, with every outcome checkpointed to a durable session so
//! multi-hour runs survive crashes and resume without repeating work.
//!
//! # Architecture
//!
//! - **Backends**: a process backend (local, no isolation) and a sandbox
//!   backend (resource-capped, network-isolated container seeded from an
//!   in-memory tar archive) behind one `ExecutionEnvironment` trait
//! - **Session store**: one JSON file per session, written atomically
//! - **Orchestrator**: drives a plugin across the {models x test cases}
//!   cross product, strictly sequentially, and aggregates metrics
//! - **Plugins**: strategy objects that call the backend and record one
//!   result per (model, test case) pair

pub mod backend;
pub mod bench;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use backend::{BackendKind, ExecutionEnvironment, ProcessBackend, SandboxBackend};
pub use bench::{BenchmarkOrchestrator, BenchmarkPlugin, BenchmarkProperties, PluginRegistry};
pub use config::Config;
pub use error::{BenchError, BenchResult};
pub use models::{Dataset, ExecutionRequest, ExecutionResult, Session, TestCaseResult};
pub use store::SessionStore;
