//! Execution engine: entry point for running one submission.
//!
//! Lifecycle of a request (every failure is terminal, nothing retries):
//!
//! ```text
//! Requested → Resolving ──✗ UnsupportedLanguage
//!                 │
//!             Staging ──✗ Staging
//!                 │
//!             Running ──✗ Spawn / Io   (workspace still released)
//!                 │
//!             Completed → Cleaning → Returned
//! ```
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ExecutionError;
use crate::language::Registry;
use crate::result::ExecutionResult;
use crate::sandbox::{DockerSandbox, ResourceLimits, Sandbox};
use crate::workspace::Workspace;

/// One submission, as received from the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    /// Seconds. Accepted for API compatibility; the ceilings stay the
    /// engine-wide ones.
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// Resolves languages and drives a request through the sandbox.
///
/// Shares nothing mutable between executions: the registry is read-only
/// and each call owns its own workspace and process. Cheap to share
/// behind an `Arc`; no admission control is applied.
pub struct Engine {
    registry: Registry,
    sandbox: Arc<dyn Sandbox>,
    limits: ResourceLimits,
    staging_dir: PathBuf,
}

impl Engine {
    pub fn new(config: &Config, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            registry: Registry::with_images(&config.images),
            sandbox,
            limits: config.sandbox.limits(),
            staging_dir: config.sandbox.staging_dir.clone(),
        }
    }

    /// Engine backed by the configured container CLI.
    pub fn docker(config: &Config) -> Self {
        Self::new(config, Arc::new(DockerSandbox::new(&config.sandbox)))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn sandbox_description(&self) -> String {
        self.sandbox.description()
    }

    /// Runs `request` to completion.
    ///
    /// Only unsupported language, staging and spawn failures produce an
    /// `Err`; anything the program does (compile error, crash, resource
    /// kill) comes back as an `ExecutionResult`.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let profile = self.registry.resolve(&request.language)?;
        if let Some(seconds) = request.timeout {
            debug!(
                "Request timeout {seconds}s ignored: cpu={}s ceiling applies",
                self.limits.cpu_time_secs
            );
        }

        let workspace = Workspace::materialize(&self.staging_dir, profile, &request.code).await?;
        info!(
            "Executing {} submission ({} bytes) in workspace {}",
            profile.id,
            request.code.len(),
            workspace.token()
        );

        let outcome = self
            .sandbox
            .run(profile, &workspace, request.stdin.as_deref(), self.limits)
            .await;

        // Cleanup happens on every path once the process is gone
        workspace.release().await;

        let result = ExecutionResult::from_outcome(outcome?);
        debug!(
            "Result: stdout {}B, stderr {}B",
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(result)
    }
}
