//! Language profiles: how to build and run one language inside a container.
//!
//! A profile is pure data. Adding a language means adding one row to
//! [`profiles::BUILTIN`]; nothing else in the engine branches on the
//! language.

pub mod profiles;
pub mod registry;

pub use registry::Registry;

/// Directory inside the container where staged files are mounted.
pub const SANDBOX_DIR: &str = "/app";

/// A build-configuration file some toolchains need next to the source
/// (e.g. a `.csproj` for `dotnet run`).
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryFile {
    /// Fixed file name required inside the container.
    pub name: &'static str,
    pub content: &'static str,
}

/// Immutable recipe for one supported language.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    /// Canonical lowercase identifier, e.g. `"python"`.
    pub id: &'static str,
    /// Source extension without the dot, e.g. `"py"`.
    pub file_extension: &'static str,
    /// Container image reference (default or operator override).
    pub image: String,
    /// File name the source is mounted as under [`SANDBOX_DIR`].
    pub mount_target: &'static str,
    /// Single shell command: compile + run, or just run.
    pub command: &'static str,
    /// True when the command runs a compile step before the program.
    pub compiled: bool,
    pub auxiliary_files: Vec<AuxiliaryFile>,
}

impl LanguageProfile {
    /// Absolute path of the source file inside the container.
    pub fn mount_path(&self) -> String {
        format!("{SANDBOX_DIR}/{}", self.mount_target)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }
}
