//! Local process execution backend
//!
//! Runs code as a child of this process with no isolation; callers are
//! responsible for trusting the code they pass in. Each call owns a fresh
//! temporary directory (unless the caller supplied one, implying shared
//! state) and releases it on every path out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::backend::language::LanguageSpec;
use crate::backend::{BackendKind, ExecutionEnvironment};
use crate::constants::DEFAULT_TIMEOUT_MS;
use crate::error::BenchResult;
use crate::models::{ExecutionRequest, ExecutionResult};
use crate::utils::validation::validate_relative_path;

/// Executes code as a local OS process
pub struct ProcessBackend {
    temp_root: PathBuf,
    default_timeout_ms: u64,
}

impl ProcessBackend {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Write the main source and auxiliary files into the working directory
    async fn populate_workspace(
        &self,
        dir: &Path,
        spec: &LanguageSpec,
        request: &ExecutionRequest,
    ) -> BenchResult<()> {
        fs::create_dir_all(dir).await?;

        for (rel_path, content) in &request.options.files {
            validate_relative_path(rel_path)?;
            let target = dir.join(rel_path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, content).await?;
        }

        fs::write(dir.join(spec.source_file), &request.code).await?;
        Ok(())
    }

    async fn execute(
        &self,
        work_dir: &Path,
        spec: &LanguageSpec,
        request: &ExecutionRequest,
        timeout_ms: u64,
    ) -> ExecutionResult {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(spec.run_command)
            .current_dir(work_dir)
            .envs(&request.options.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Run the shell as its own group leader so a timeout can reap the
        // whole pipeline, not just the shell
        #[cfg(unix)]
        command.process_group(0);

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::infrastructure_failure(
                    format!("failed to spawn process: {e}"),
                    start.elapsed().as_millis() as u64,
                );
            }
        };
        let child_pid = child.id();

        // Accumulate output incrementally while the process runs
        let mut stdout_pipe = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        match timeout(Duration::from_millis(timeout_ms), child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                let exit_code = exit_code_of(&status);
                ExecutionResult::finished(
                    String::from_utf8_lossy(&stdout).into_owned(),
                    String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code,
                    start.elapsed().as_millis() as u64,
                )
            }
            Ok(Err(e)) => {
                kill_process_group(child_pid);
                let _ = child.kill().await;
                ExecutionResult::infrastructure_failure(
                    format!("failed to wait for process: {e}"),
                    start.elapsed().as_millis() as u64,
                )
            }
            Err(_) => {
                kill_process_group(child_pid);
                let _ = child.kill().await;
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                ExecutionResult::timed_out(
                    String::from_utf8_lossy(&stdout).into_owned(),
                    String::from_utf8_lossy(&stderr).into_owned(),
                    timeout_ms,
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl ExecutionEnvironment for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn run_code(&self, request: ExecutionRequest) -> BenchResult<ExecutionResult> {
        let spec = LanguageSpec::for_language(&request.language)?;
        let timeout_ms = request
            .options
            .timeout_ms
            .unwrap_or(self.default_timeout_ms);

        // A caller-supplied directory implies shared state and is not removed
        let (work_dir, ephemeral) = match &request.options.working_dir {
            Some(dir) => (dir.clone(), false),
            None => (
                self.temp_root.join(format!("codebench-{}", Uuid::new_v4())),
                true,
            ),
        };

        let prepared = self.populate_workspace(&work_dir, spec, &request).await;
        let result = match prepared {
            Ok(()) => self.execute(&work_dir, spec, &request, timeout_ms).await,
            Err(e) => {
                if ephemeral {
                    let _ = fs::remove_dir_all(&work_dir).await;
                }
                return Err(e);
            }
        };

        if ephemeral {
            if let Err(e) = fs::remove_dir_all(&work_dir).await {
                tracing::warn!(dir = %work_dir.display(), "failed to clean up temp dir: {e}");
            }
        }

        Ok(result)
    }
}

fn exit_code_of(status: &std::process::ExitStatus) -> i64 {
    if let Some(code) = status.code() {
        return i64::from(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return i64::from(-signal);
        }
    }
    -1
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child is its own group leader; this reaps grandchildren too
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionOptions;
    use std::collections::HashMap;

    fn backend(root: &Path) -> ProcessBackend {
        ProcessBackend::new(root)
    }

    fn bash_request(code: &str) -> ExecutionRequest {
        ExecutionRequest::new(code, "bash")
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let result = backend(root.path())
            .run_code(bash_request("echo out; echo err >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert_eq!(result.exit_code, 3);
        assert!(!result.successful);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_successful_run() {
        let root = tempfile::tempdir().unwrap();
        let result = backend(root.path())
            .run_code(bash_request("echo hello"))
            .await
            .unwrap();

        assert!(result.successful);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_timeout_enforced_within_margin() {
        let root = tempfile::tempdir().unwrap();
        let mut request = bash_request("sleep 30");
        request.options.timeout_ms = Some(200);

        let started = Instant::now();
        let result = backend(root.path()).run_code(request).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
        assert!(!result.successful);
        assert_eq!(result.exit_code, -1);
        assert!(result.is_timeout());
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_temp_dir_behind() {
        let root = tempfile::tempdir().unwrap();
        let mut request = bash_request("sleep 30");
        request.options.timeout_ms = Some(200);

        backend(root.path()).run_code(request).await.unwrap();

        let leftovers = std::fs::read_dir(root.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_auxiliary_files_written_with_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        let mut files = HashMap::new();
        files.insert("data/input.txt".to_string(), "42".to_string());

        let request = bash_request("cat data/input.txt").with_options(ExecutionOptions {
            files,
            ..Default::default()
        });

        let result = backend(root.path()).run_code(request).await.unwrap();
        assert!(result.successful);
        assert_eq!(result.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_environment_merged() {
        let root = tempfile::tempdir().unwrap();
        let mut environment = HashMap::new();
        environment.insert("GREETING".to_string(), "salut".to_string());

        let request = bash_request("echo \"$GREETING\"").with_options(ExecutionOptions {
            environment,
            ..Default::default()
        });

        let result = backend(root.path()).run_code(request).await.unwrap();
        assert_eq!(result.stdout.trim(), "salut");
    }

    #[tokio::test]
    async fn test_ephemeral_dir_removed_after_run() {
        let root = tempfile::tempdir().unwrap();
        backend(root.path())
            .run_code(bash_request("echo done"))
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_caller_supplied_working_dir_preserved() {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("shared");

        let request = bash_request("echo keep").with_options(ExecutionOptions {
            working_dir: Some(work_dir.clone()),
            ..Default::default()
        });

        backend(root.path()).run_code(request).await.unwrap();
        assert!(work_dir.join("main.sh").exists());
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_before_execution() {
        let root = tempfile::tempdir().unwrap();
        let err = backend(root.path())
            .run_code(ExecutionRequest::new("BEGIN", "cobol"))
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::BenchError::UnsupportedLanguage(_)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_escaping_file_paths_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut files = HashMap::new();
        files.insert("../escape.txt".to_string(), "nope".to_string());

        let request = bash_request("true").with_options(ExecutionOptions {
            files,
            ..Default::default()
        });

        assert!(backend(root.path()).run_code(request).await.is_err());
    }
}
