use serde::{Deserialize, Serialize};

use crate::sandbox::{ProcessOutcome, Termination};

/// Appended to stderr when the isolation layer force-killed the process.
pub const RESOURCE_LIMIT_NOTE: &str =
    "Process was killed: it likely exceeded its memory or CPU-time limit.";

/// The only artifact handed back to callers.
///
/// Compile errors and runtime errors are not distinguished: both are
/// whatever the toolchain or program wrote to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Converts a raw outcome, annotating stderr on a resource-limit kill.
    pub fn from_outcome(outcome: ProcessOutcome) -> Self {
        let killed = outcome.termination() == Termination::ResourceKill;
        let stdout = String::from_utf8_lossy(&outcome.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&outcome.stderr).into_owned();

        if killed {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(RESOURCE_LIMIT_NOTE);
        }

        Self { stdout, stderr }
    }

    /// True when stderr carries the resource-limit note.
    pub fn hit_resource_limit(&self) -> bool {
        self.stderr.ends_with(RESOURCE_LIMIT_NOTE)
    }
}
