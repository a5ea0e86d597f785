//! Sandbox runner: launches one isolated process per execution.
//!
//! The runner is a trait so the engine can be driven by other isolation
//! backends; [`DockerSandbox`] is the production implementation.
//!
//! Resource governance is delegated to the isolation layer itself:
//!
//! 1. CPU time: a kernel RLIMIT_CPU inside the container
//! 2. Memory: the container's cgroup limit, swap pinned to the same value
//!
//! There is no wall-clock watchdog on the host side. A process that
//! sleeps without burning CPU keeps running until it exits on its own.

mod docker;

pub use docker::DockerSandbox;

use std::process::ExitStatus;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::language::LanguageProfile;
use crate::workspace::Workspace;

/// Exit code reported when the isolation layer SIGKILLs the process
/// (128 + 9). Covers OOM kills and any other forced kill.
pub const SENTINEL_EXIT_CODE: i32 = 137;

/// Exit code of a shell whose child died of SIGXCPU (128 + 24),
/// i.e. the RLIMIT_CPU soft limit was reached.
pub const CPU_LIMIT_EXIT_CODE: i32 = 152;

/// Exit code the container CLI itself uses when the container could not
/// be created or started (daemon unreachable, unknown image, bad flag).
pub const RUNTIME_FAILURE_EXIT_CODE: i32 = 125;

const SIGKILL: i32 = 9;
const SIGXCPU: i32 = 24;

/// Engine-wide ceilings applied to a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_time_secs: u64,
    pub memory_mb: u64,
}

/// How the sandboxed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with the program's (or toolchain's) exit code.
    Exited(i32),
    /// The CLI process was killed by a signal unrelated to resource limits.
    Signaled(i32),
    /// Forcibly killed by the isolation layer. The cause (memory, CPU time,
    /// external kill) cannot be told apart from the exit status alone.
    ResourceKill,
    /// The container CLI ran but never got the program started: it exited
    /// 125 without the container writing anything to stdout.
    RuntimeFailure,
}

/// Raw capture of one run, consumed once by the result normalizer.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessOutcome {
    pub fn from_status(stdout: Vec<u8>, stderr: Vec<u8>, status: ExitStatus) -> Self {
        Self {
            stdout,
            stderr,
            exit_code: status.code(),
            signal: exit_signal(&status),
        }
    }

    pub fn termination(&self) -> Termination {
        match (self.exit_code, self.signal) {
            (Some(SENTINEL_EXIT_CODE | CPU_LIMIT_EXIT_CODE), _) => Termination::ResourceKill,
            (Some(RUNTIME_FAILURE_EXIT_CODE), _) if self.stdout.is_empty() => {
                Termination::RuntimeFailure
            }
            (Some(code), _) => Termination::Exited(code),
            (None, Some(SIGKILL | SIGXCPU)) => Termination::ResourceKill,
            (None, Some(signal)) => Termination::Signaled(signal),
            (None, None) => Termination::Signaled(0),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// An isolation backend able to run a staged workspace under a profile.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs the profile's command against `workspace`, feeding `stdin`
    /// and capturing both output streams until the process terminates.
    ///
    /// Returns `ExecutionError::Spawn` if the isolation mechanism cannot
    /// be launched or reports that it could not start the program. Program failures are not errors: they come back in
    /// the outcome.
    async fn run(
        &self,
        profile: &LanguageProfile,
        workspace: &Workspace,
        stdin: Option<&str>,
        limits: ResourceLimits,
    ) -> Result<ProcessOutcome, ExecutionError>;

    /// Human-readable description of the backend, e.g. `"docker"`.
    fn description(&self) -> String;
}
