//! Sandboxed container execution backend
//!
//! Runs code inside a resource-capped, network-isolated container. The
//! workspace is seeded by uploading an in-memory tar archive before the
//! container starts, and output is read back from the attached multiplexed
//! stream. The container is removed on every path out, including timeout
//! and infrastructure failure.

use std::collections::HashMap;
use std::time::Instant;

use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig, ResourcesUlimits};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    KillContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    UploadToContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bollard::{body_full, Docker};
use futures::StreamExt;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::backend::archive::ArchiveBuilder;
use crate::backend::demux::{OutputDemuxer, StreamKind};
use crate::backend::language::LanguageSpec;
use crate::backend::{BackendKind, ExecutionEnvironment};
use crate::config::DockerConfig;
use crate::constants::{
    DEFAULT_MEMORY_LIMIT, DEFAULT_TIMEOUT_MS, SANDBOX_NOFILE_LIMIT, SANDBOX_PIDS_LIMIT,
    SANDBOX_TMPFS_OPTIONS, SANDBOX_WORKSPACE,
};
use crate::error::{BenchError, BenchResult};
use crate::models::{ExecutionRequest, ExecutionResult};
use crate::utils::validation::validate_relative_path;

/// Executes code inside isolated containers
pub struct SandboxBackend {
    docker: Docker,
    default_timeout_ms: u64,
    default_memory_limit: String,
}

impl SandboxBackend {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_memory_limit: DEFAULT_MEMORY_LIMIT.to_string(),
        }
    }

    /// Connect to the daemon and verify it responds before any work begins
    pub async fn connect(config: &DockerConfig) -> BenchResult<Self> {
        let docker = Docker::connect_with_socket(
            &config.socket_path,
            120,
            bollard::API_DEFAULT_VERSION,
        )?;
        let version = docker.version().await?;
        tracing::info!(
            version = version.version.as_deref().unwrap_or("unknown"),
            "connected to Docker daemon"
        );
        Ok(Self::new(docker))
    }

    pub fn with_defaults(mut self, timeout_ms: u64, memory_limit: impl Into<String>) -> Self {
        self.default_timeout_ms = timeout_ms;
        self.default_memory_limit = memory_limit.into();
        self
    }

    /// Pull the image unless it is already present locally
    async fn ensure_image(&self, image: &str) -> BenchResult<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image, "pulling container image");
        let options = CreateImageOptionsBuilder::default()
            .from_image(image)
            .build();
        let mut pull = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull.next().await {
            progress.map_err(|e| {
                BenchError::Infrastructure(format!("failed to pull image {image}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Package the main source and auxiliary files into the seed archive
    fn build_archive(spec: &LanguageSpec, request: &ExecutionRequest) -> BenchResult<Vec<u8>> {
        let mut builder = ArchiveBuilder::new();

        let mut paths: Vec<&String> = request.options.files.keys().collect();
        paths.sort();
        for path in paths {
            validate_relative_path(path)?;
            builder.append_file(path, request.options.files[path].as_bytes())?;
        }
        builder.append_file(spec.source_file, request.code.as_bytes())?;
        Ok(builder.finish())
    }

    /// Resource-constraint block applied to every sandbox container
    fn host_config(memory_limit: &str) -> BenchResult<HostConfig> {
        let memory_bytes = parse_memory_limit(memory_limit)?;
        Ok(HostConfig {
            memory: Some(memory_bytes),
            // Swap pinned to the memory ceiling so paging cannot evade it
            memory_swap: Some(memory_bytes),
            network_mode: Some("none".to_string()),
            pids_limit: Some(SANDBOX_PIDS_LIMIT),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                SANDBOX_TMPFS_OPTIONS.to_string(),
            )])),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(SANDBOX_NOFILE_LIMIT),
                hard: Some(SANDBOX_NOFILE_LIMIT),
            }]),
            ..Default::default()
        })
    }

    async fn execute_sandboxed(
        &self,
        spec: &LanguageSpec,
        request: &ExecutionRequest,
        archive: &[u8],
        host_config: HostConfig,
        timeout_ms: u64,
    ) -> BenchResult<ExecutionResult> {
        self.ensure_image(spec.image).await?;

        let container_name = format!("codebench-{}", Uuid::new_v4());
        let options = CreateContainerOptionsBuilder::default()
            .name(&container_name)
            .build();

        let env: Vec<String> = request
            .options
            .environment
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let config = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            cmd: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                spec.run_command.to_string(),
            ]),
            working_dir: Some(SANDBOX_WORKSPACE.to_string()),
            env: Some(env),
            tty: Some(false),
            open_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                "codebench.managed".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), config).await?;

        // From here on the container exists; remove it on every path out
        let outcome = self
            .run_created_container(&container.id, archive, timeout_ms)
            .await;

        let remove = RemoveContainerOptionsBuilder::default().force(true).build();
        if let Err(e) = self
            .docker
            .remove_container(&container.id, Some(remove))
            .await
        {
            tracing::warn!(container_id = %container.id, "failed to remove container: {e}");
        }

        outcome
    }

    async fn run_created_container(
        &self,
        container_id: &str,
        archive: &[u8],
        timeout_ms: u64,
    ) -> BenchResult<ExecutionResult> {
        let upload = UploadToContainerOptionsBuilder::default()
            .path(SANDBOX_WORKSPACE)
            .build();
        self.docker
            .upload_to_container(container_id, Some(upload), body_full(archive.to_vec().into()))
            .await?;

        // Attach before starting so no early output is missed
        let attach = AttachContainerOptionsBuilder::default()
            .stdout(true)
            .stderr(true)
            .stream(true)
            .logs(true)
            .build();
        let attached = self
            .docker
            .attach_container(container_id, Some(attach))
            .await?;
        let mut output = attached.output;

        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await?;
        let start = Instant::now();

        let mut demuxer = OutputDemuxer::new();
        let drained = timeout(Duration::from_millis(timeout_ms), async {
            while let Some(frame) = output.next().await {
                match frame {
                    Ok(LogOutput::StdOut { message }) => {
                        demuxer.push(StreamKind::Stdout, &message)
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        demuxer.push(StreamKind::Stderr, &message)
                    }
                    Ok(LogOutput::Console { message }) => {
                        demuxer.push(StreamKind::Stdout, &message)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("attach stream closed: {e}");
                        break;
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            // Deadline expired with the container still running
            let _ = self
                .docker
                .kill_container(container_id, None::<KillContainerOptions>)
                .await;
            let (stdout, stderr) = demuxer.into_output();
            return Ok(ExecutionResult::timed_out(stdout, stderr, timeout_ms));
        }

        // Stream closed: the process exited; fetch its exit code
        let wait = WaitContainerOptionsBuilder::default()
            .condition("not-running")
            .build();
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait));
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                return Err(BenchError::Infrastructure(format!(
                    "failed to wait for container: {e}"
                )));
            }
            None => -1,
        };

        let (stdout, stderr) = demuxer.into_output();
        Ok(ExecutionResult::finished(
            stdout,
            stderr,
            exit_code,
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[async_trait::async_trait]
impl ExecutionEnvironment for SandboxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sandbox
    }

    async fn run_code(&self, request: ExecutionRequest) -> BenchResult<ExecutionResult> {
        // Caller errors are rejected before any container resource exists
        let spec = LanguageSpec::for_language(&request.language)?;
        let timeout_ms = request
            .options
            .timeout_ms
            .unwrap_or(self.default_timeout_ms);
        let memory_limit = request
            .options
            .memory_limit
            .clone()
            .unwrap_or_else(|| self.default_memory_limit.clone());

        let archive = Self::build_archive(spec, &request)?;
        let host_config = Self::host_config(&memory_limit)?;

        let started = Instant::now();
        match self
            .execute_sandboxed(spec, &request, &archive, host_config, timeout_ms)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                // Infrastructure failures surface in the result, never as an
                // exception escaping the backend
                tracing::error!(language = %request.language, "sandbox execution failed: {e}");
                Ok(ExecutionResult::infrastructure_failure(
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                ))
            }
        }
    }
}

/// Parse a memory limit with an optional k/m/g suffix into bytes
pub(crate) fn parse_memory_limit(value: &str) -> BenchResult<i64> {
    let trimmed = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = match trimmed.as_bytes().last() {
        Some(b'k') => (&trimmed[..trimmed.len() - 1], 1024i64),
        Some(b'm') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some(b'g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        Some(_) => (trimmed.as_str(), 1),
        None => {
            return Err(BenchError::Validation(
                "memory limit must be non-empty".to_string(),
            ));
        }
    };

    let amount: i64 = digits.parse().map_err(|_| {
        BenchError::Validation(format!("invalid memory limit '{value}'"))
    })?;
    if amount <= 0 {
        return Err(BenchError::Validation(format!(
            "memory limit '{value}' must be positive"
        )));
    }
    amount.checked_mul(multiplier).ok_or_else(|| {
        BenchError::Validation(format!("memory limit '{value}' overflows"))
    })
}
