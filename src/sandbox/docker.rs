use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::{ProcessOutcome, ResourceLimits, Sandbox, Termination, RUNTIME_FAILURE_EXIT_CODE};
use crate::config::SandboxConfig;
use crate::error::ExecutionError;
use crate::language::{LanguageProfile, SANDBOX_DIR};
use crate::workspace::Workspace;

/// Captured stream size past which a warning is logged
const LARGE_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

/// Runs each execution as `docker run --rm` (or a compatible CLI).
///
/// The container gets the staged files as read-only bind mounts, a
/// RLIMIT_CPU ceiling and a cgroup memory ceiling, and is removed by the
/// daemon when it exits.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    program: String,
    program_args: Vec<String>,
    network: Option<String>,
}

impl DockerSandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            program: config.program.clone(),
            program_args: config.program_args.clone(),
            network: config.network.clone(),
        }
    }

    /// Arguments after the program (and its fixed `program_args`).
    ///
    /// Shape: interactive stdin, auto-remove, quiet image pulls, CPU
    /// ceiling, memory ceiling, read-only mounts, image, `sh -c <command>`.
    fn run_args(
        &self,
        container_name: &str,
        profile: &LanguageProfile,
        workspace: &Workspace,
        limits: ResourceLimits,
    ) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            // Keeps "Unable to find image ... Pulling" out of the program's stderr
            "--quiet".to_string(),
            "--ulimit".to_string(),
            format!("cpu={0}:{0}", limits.cpu_time_secs),
            format!("--memory={}m", limits.memory_mb),
            format!("--memory-swap={}m", limits.memory_mb),
        ];

        if let Some(ref network) = self.network {
            args.push(format!("--network={network}"));
        }

        for file in workspace.files() {
            args.push("-v".to_string());
            args.push(format!(
                "{}:{SANDBOX_DIR}/{}:ro",
                file.host_path.display(),
                file.target_name
            ));
        }

        args.push(profile.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(profile.command.to_string());
        args
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(
        &self,
        profile: &LanguageProfile,
        workspace: &Workspace,
        stdin: Option<&str>,
        limits: ResourceLimits,
    ) -> Result<ProcessOutcome, ExecutionError> {
        let container_name = format!("polyexec-{}", Uuid::new_v4());
        let span = execution_span(&container_name, profile);

        self.run_container(&container_name, profile, workspace, stdin, limits)
            .instrument(span)
            .await
    }

    fn description(&self) -> String {
        if self.program_args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.program_args.join(" "))
        }
    }
}

impl DockerSandbox {
    async fn run_container(
        &self,
        container_name: &str,
        profile: &LanguageProfile,
        workspace: &Workspace,
        stdin: Option<&str>,
        limits: ResourceLimits,
    ) -> Result<ProcessOutcome, ExecutionError> {
        let args = self.run_args(container_name, profile, workspace, limits);

        debug!("{} {} {}", self.program, self.program_args.join(" "), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&self.program_args)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        info!(
            "Started ({}, cpu={}s, mem={}MB)",
            profile.image, limits.cpu_time_secs, limits.memory_mb
        );

        // Three concurrent legs: neither stream can stall the other,
        // and a large stdin cannot deadlock against unread output.
        let (written, stdout, stderr) = tokio::join!(
            feed_stdin(child.stdin.take(), stdin),
            drain(child.stdout.take(), "stdout"),
            drain(child.stderr.take(), "stderr"),
        );
        written?;
        let stdout = stdout?;
        let stderr = stderr?;

        let status = child.wait().await?;
        let outcome = ProcessOutcome::from_status(stdout, stderr, status);

        match outcome.termination() {
            Termination::RuntimeFailure => {
                let reason = runtime_failure_reason(&outcome.stderr);
                warn!("{} could not start the container: {reason}", self.program);
                return Err(self.spawn_error(std::io::Error::other(reason)));
            }
            Termination::ResourceKill => {
                warn!("Killed by the isolation layer (status {status})")
            }
            termination => info!(
                "Finished: {termination:?} (stdout {}B, stderr {}B)",
                outcome.stdout.len(),
                outcome.stderr.len()
            ),
        }

        Ok(outcome)
    }

    fn spawn_error(&self, source: std::io::Error) -> ExecutionError {
        ExecutionError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

/// Span wrapping one container run, so every event of the run carries
/// its execution id and language.
fn execution_span(container_name: &str, profile: &LanguageProfile) -> Span {
    info_span!("execution", id = %container_name, language = profile.id)
}

/// Last non-empty line the CLI wrote, e.g. "docker: Cannot connect to the
/// Docker daemon ...".
fn runtime_failure_reason(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("exited with status {RUNTIME_FAILURE_EXIT_CODE}"))
}

/// Writes the caller's input, then closes the pipe so the program sees EOF.
async fn feed_stdin(pipe: Option<ChildStdin>, input: Option<&str>) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };

    if let Some(input) = input {
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            // The program exited (or closed stdin) without reading everything
            if e.kind() == ErrorKind::BrokenPipe {
                debug!("stdin closed early by sandboxed process");
                return Ok(());
            }
            return Err(e);
        }
    }

    match pipe.shutdown().await {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

/// Reads a stream to EOF into memory.
///
/// Capture is unbounded; the CPU-time ceiling is what limits how much a
/// program can print. Anything past [`LARGE_OUTPUT_BYTES`] is logged.
async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, name: &str) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    if is_large_output(buf.len()) {
        warn!("Captured {} MB of {name}", buf.len() / (1024 * 1024));
    }
    Ok(buf)
}

fn is_large_output(len: usize) -> bool {
    len >= LARGE_OUTPUT_BYTES
}
