use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort an execution before an [`ExecutionResult`] exists.
///
/// Compile errors, runtime errors and resource-limit kills are *not*
/// represented here: they are ordinary program output and come back as
/// a normal result.
///
/// [`ExecutionResult`]: crate::result::ExecutionResult
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No profile is registered for the requested language.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Writing the source or an auxiliary file to the staging area failed.
    #[error("failed to stage {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container CLI could not be launched at all.
    #[error("failed to launch sandbox program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipe or wait failure while the sandboxed process was running.
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// True when the request itself is at fault (maps to a 4xx at an API edge).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExecutionError::UnsupportedLanguage(_))
    }
}
