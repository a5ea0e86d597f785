//! Pre-pulling of language images.
//!
//! `docker run` pulls a missing image on first use, so the first
//! submission per language would pay for the download. `polyexec --pull`
//! fetches every configured image ahead of time.
use std::process::Stdio;

use anyhow::{bail, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::config::SandboxConfig;
use crate::language::Registry;

/// Outcome of pulling one image.
#[derive(Debug, Clone)]
pub struct PullReport {
    pub image: String,
    /// Languages that run on this image
    pub languages: Vec<&'static str>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl PullReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Distinct images of the registry, in table order, with their languages.
pub fn unique_images(registry: &Registry) -> Vec<(String, Vec<&'static str>)> {
    let mut images: Vec<(String, Vec<&'static str>)> = Vec::new();
    for profile in registry.profiles() {
        match images.iter_mut().find(|(image, _)| *image == profile.image) {
            Some((_, languages)) => languages.push(profile.id),
            None => images.push((profile.image.clone(), vec![profile.id])),
        }
    }
    images
}

/// Pulls every image sequentially, retrying each up to `max_attempts`
/// times with `backoff` between attempts.
pub async fn pull_all(
    config: &SandboxConfig,
    registry: &Registry,
    max_attempts: u32,
    mut backoff: Backoff,
) -> Vec<PullReport> {
    let mut reports = Vec::new();

    for (image, languages) in unique_images(registry) {
        backoff.reset();
        info!("Pulling {image} ({})", languages.join(", "));

        let error = loop {
            match pull_once(config, &image).await {
                Ok(()) => break None,
                Err(e) => {
                    let delay = backoff.next_delay();
                    if backoff.exhausted(max_attempts) {
                        warn!("Giving up on {image} after {} attempt(s): {e}", backoff.attempt);
                        break Some(e.to_string());
                    }
                    warn!("Pull of {image} failed: {e}; retrying in {}ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
            }
        };

        reports.push(PullReport {
            image,
            languages,
            attempts: backoff.attempt + u32::from(error.is_none()),
            error,
        });
    }

    reports
}

async fn pull_once(config: &SandboxConfig, image: &str) -> Result<()> {
    let output = Command::new(&config.program)
        .args(&config.program_args)
        .args(["pull", image])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} ({})", stderr.trim(), output.status);
    }
    Ok(())
}
