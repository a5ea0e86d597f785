/// Ephemeral staging of submitted source code on the host filesystem.
///
/// Every execution owns one `Workspace`: the source file plus any
/// auxiliary build files, each under a name derived from a unique token
/// (`<unix-millis>-<random hex>`). Concurrent executions share the
/// staging directory and rely only on that uniqueness, never on locks.
///
/// Files are created with create-new semantics, so a token collision can
/// never overwrite another execution's source; it just draws a new token.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::language::LanguageProfile;

/// Prefix of every staged file name
const FILE_PREFIX: &str = "polyexec";

/// Fresh tokens tried before giving up on an `AlreadyExists` collision
const MAX_TOKEN_ATTEMPTS: u32 = 8;

/// One staged host file and the name it must have inside the container.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedFile {
    pub host_path: PathBuf,
    pub target_name: String,
}

#[derive(Debug)]
pub struct Workspace {
    token: String,
    created_at: DateTime<Utc>,
    /// Source first, then auxiliary files in profile order
    files: Vec<StagedFile>,
    released: bool,
}

impl Workspace {
    /// Writes `code` (and the profile's auxiliary files) into `staging_dir`.
    ///
    /// Fails with `ExecutionError::Staging` if any write fails; files
    /// already written for this workspace are removed before returning.
    pub async fn materialize(
        staging_dir: &Path,
        profile: &LanguageProfile,
        code: &str,
    ) -> Result<Self, ExecutionError> {
        Self::materialize_with(staging_dir, profile, code, new_token).await
    }

    async fn materialize_with(
        staging_dir: &Path,
        profile: &LanguageProfile,
        code: &str,
        mut next_token: impl FnMut() -> String,
    ) -> Result<Self, ExecutionError> {
        // Bind mounts need absolute host paths
        let dir = std::path::absolute(staging_dir).map_err(|e| ExecutionError::Staging {
            path: staging_dir.to_path_buf(),
            source: e,
        })?;

        let mut attempt = 0;
        let (token, source_path) = loop {
            attempt += 1;
            let token = next_token();
            let path = dir.join(format!("{FILE_PREFIX}-{token}.{}", profile.file_extension));
            match create_new(&path, code).await {
                Ok(()) => break (token, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_TOKEN_ATTEMPTS => {
                    debug!("Staging token collision on {}, retrying", path.display());
                }
                Err(e) => return Err(ExecutionError::Staging { path, source: e }),
            }
        };

        let mut workspace = Workspace {
            token,
            created_at: Utc::now(),
            files: vec![StagedFile {
                host_path: source_path,
                target_name: profile.mount_target.to_string(),
            }],
            released: false,
        };

        for aux in &profile.auxiliary_files {
            let path = dir.join(format!("{FILE_PREFIX}-{}-{}", workspace.token, aux.name));
            if let Err(e) = create_new(&path, aux.content).await {
                // Drop removes what was already written
                return Err(ExecutionError::Staging { path, source: e });
            }
            workspace.files.push(StagedFile {
                host_path: path,
                target_name: aux.name.to_string(),
            });
        }

        debug!(
            "Staged workspace {} ({} file(s)) in {}",
            workspace.token,
            workspace.files.len(),
            dir.display()
        );

        Ok(workspace)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The staged source file.
    pub fn source(&self) -> &StagedFile {
        &self.files[0]
    }

    pub fn auxiliary(&self) -> &[StagedFile] {
        &self.files[1..]
    }

    /// Every file owned by this workspace.
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Best-effort removal of every owned file.
    ///
    /// Failures are logged and swallowed: the execution result has
    /// already been computed and stays valid.
    pub async fn release(mut self) {
        for file in &self.files {
            if let Err(e) = tokio::fs::remove_file(&file.host_path).await {
                log_cleanup_failure(&file.host_path, &e);
            }
        }
        self.released = true;
        debug!("Released workspace {}", self.token);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Reached on staging failure or when the execution future is dropped
        for file in &self.files {
            if let Err(e) = std::fs::remove_file(&file.host_path) {
                log_cleanup_failure(&file.host_path, &e);
            }
        }
    }
}

fn log_cleanup_failure(path: &Path, e: &std::io::Error) {
    if e.kind() == ErrorKind::NotFound {
        debug!("Staged file {} already gone", path.display());
    } else {
        warn!("Failed to remove staged file {}: {e}", path.display());
    }
}

/// `<unix-millis>-<16 hex chars>`; the suffix comes from the thread-local CSPRNG.
fn new_token() -> String {
    let suffix: [u8; 8] = rand::random();
    format!("{}-{}", Utc::now().timestamp_millis(), hex::encode(suffix))
}

/// Creates `path` (failing if it exists) and writes `content` to it.
async fn create_new(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}
