//! Common test utilities.
//!
//! Integration tests drive the real `DockerSandbox` against a fake
//! container CLI: a POSIX shell script invoked as `sh <script> run ...`.
//! The script receives exactly the argument vector `docker` would.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use polyexec::config::Config;
use polyexec::Engine;
use tempfile::TempDir;

/// Sets `$src` to the host path of the first read-only mount (the source).
const PRELUDE: &str = r#"
src=""
for a in "$@"; do
  case "$a" in
    *:/app/*:ro) [ -z "$src" ] && src="${a%%:/app/*}" ;;
  esac
done
"#;

pub struct Harness {
    pub dir: TempDir,
    pub engine: Engine,
}

impl Harness {
    /// Engine whose container CLI runs `body` (after the prelude).
    pub fn new(body: &str) -> Self {
        Self::with_config(body, |_| {})
    }

    pub fn with_config(body: &str, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-docker.sh");
        std::fs::write(&script, format!("{PRELUDE}\n{body}\n")).unwrap();

        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();

        let mut config = Config::default();
        config.sandbox.program = "sh".to_string();
        config.sandbox.program_args = vec![script.to_string_lossy().into_owned()];
        config.sandbox.staging_dir = staging;
        tweak(&mut config);

        let engine = Engine::docker(&config);
        Self { dir, engine }
    }

    pub fn staging(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    /// Files currently left in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging()).unwrap().count()
    }

    /// Marker the fake CLI can touch to prove it was launched.
    pub fn marker(&self) -> PathBuf {
        self.dir.path().join("spawned")
    }
}

pub fn exists(path: &str) -> bool {
    Path::new(path.trim()).exists()
}
