use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use serde::Deserialize;

use crate::language::profiles::canonical_id;
use crate::sandbox::ResourceLimits;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Image overrides, keyed by language id or alias.
    /// Normalized to canonical ids by `Config::load`.
    #[serde(default)]
    pub images: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Container CLI, e.g. "docker" or "podman"
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before `run` (e.g. `program = "sudo"`, `program_args = ["docker"]`)
    #[serde(default)]
    pub program_args: Vec<String>,
    #[serde(default = "default_cpu_time_limit")]
    pub cpu_time_limit_secs: u64,
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    /// Host directory where sources are staged before mounting
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Container network mode; omitted from the invocation when unset
    #[serde(default)]
    pub network: Option<String>,
}

fn default_program() -> String {
    "docker".to_string()
}

fn default_cpu_time_limit() -> u64 {
    20
}

fn default_memory_limit() -> u64 {
    512
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            cpu_time_limit_secs: default_cpu_time_limit(),
            memory_limit_mb: default_memory_limit(),
            staging_dir: default_staging_dir(),
            network: None,
        }
    }
}

impl SandboxConfig {
    /// Engine-wide resource ceilings applied to every run.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_time_secs: self.cpu_time_limit_secs,
            memory_mb: self.memory_limit_mb,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {path}: {e}"))?;
        Self::parse(&content)
    }

    /// Parses a TOML document, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Checks the ceilings and rewrites image keys to canonical ids.
    fn validate(&mut self) -> anyhow::Result<()> {
        if self.sandbox.cpu_time_limit_secs == 0 {
            bail!("sandbox.cpu_time_limit_secs must be greater than 0");
        }
        if self.sandbox.memory_limit_mb == 0 {
            bail!("sandbox.memory_limit_mb must be greater than 0");
        }
        if self.sandbox.program.trim().is_empty() {
            bail!("sandbox.program must not be empty");
        }

        let mut images = HashMap::with_capacity(self.images.len());
        for (key, image) in self.images.drain() {
            let id = canonical_id(&key)
                .ok_or_else(|| anyhow!("[images] names an unsupported language: '{key}'"))?;
            if image.trim().is_empty() {
                bail!("[images] {key}: image reference must not be empty");
            }
            images.insert(id.to_string(), image);
        }
        self.images = images;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.sandbox.program, "docker");
        assert!(config.sandbox.program_args.is_empty());
        assert_eq!(config.sandbox.cpu_time_limit_secs, 20);
        assert_eq!(config.sandbox.memory_limit_mb, 512);
        assert_eq!(config.sandbox.staging_dir, std::env::temp_dir());
        assert!(config.sandbox.network.is_none());
        assert!(config.images.is_empty());
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.sandbox.limits().cpu_time_secs, 20);
        assert_eq!(config.sandbox.limits().memory_mb, 512);
    }

    // ── parsing ─────────────────────────────────────────

    #[test]
    fn test_full_document() {
        let config = Config::parse(
            r#"
            [sandbox]
            program = "sudo"
            program_args = ["docker"]
            cpu_time_limit_secs = 5
            memory_limit_mb = 128
            staging_dir = "/var/tmp/polyexec"
            network = "none"

            [images]
            py = "registry.local/python:3.11"
            "C++" = "registry.local/gcc:12"
            "#,
        )
        .unwrap();

        assert_eq!(config.sandbox.program, "sudo");
        assert_eq!(config.sandbox.program_args, vec!["docker".to_string()]);
        assert_eq!(config.sandbox.cpu_time_limit_secs, 5);
        assert_eq!(config.sandbox.memory_limit_mb, 128);
        assert_eq!(config.sandbox.staging_dir, PathBuf::from("/var/tmp/polyexec"));
        assert_eq!(config.sandbox.network.as_deref(), Some("none"));
        // Aliases are normalized to canonical ids
        assert_eq!(config.images["python"], "registry.local/python:3.11");
        assert_eq!(config.images["cpp"], "registry.local/gcc:12");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("POLYEXEC_TEST_REGISTRY", "mirror.example.org");
        let config = Config::parse(
            r#"
            [images]
            ruby = "${POLYEXEC_TEST_REGISTRY}/ruby:3.3"
            "#,
        )
        .unwrap();
        assert_eq!(config.images["ruby"], "mirror.example.org/ruby:3.3");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polyexec.toml");
        std::fs::write(&path, "[sandbox]\nmemory_limit_mb = 256\n").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.sandbox.memory_limit_mb, 256);
        assert_eq!(config.sandbox.cpu_time_limit_secs, 20);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/polyexec.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/polyexec.toml"));
    }

    // ── validation ──────────────────────────────────────

    #[test]
    fn test_rejects_unknown_image_language() {
        let err = Config::parse("[images]\ncobol = \"cobol:latest\"\n").unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_rejects_zero_cpu_limit() {
        let err = Config::parse("[sandbox]\ncpu_time_limit_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("cpu_time_limit_secs"));
    }

    #[test]
    fn test_rejects_zero_memory_limit() {
        assert!(Config::parse("[sandbox]\nmemory_limit_mb = 0\n").is_err());
    }

    #[test]
    fn test_rejects_empty_image() {
        assert!(Config::parse("[images]\ngo = \"\"\n").is_err());
    }
}
