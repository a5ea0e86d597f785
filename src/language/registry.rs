use std::collections::HashMap;

use tracing::debug;

use super::profiles::{canonical_id, BUILTIN};
use super::LanguageProfile;
use crate::error::ExecutionError;

/// Read-only table of language profiles, built once at startup.
///
/// Resolution is a pure lookup: no process is spawned and the filesystem
/// is never touched.
#[derive(Debug, Clone)]
pub struct Registry {
    profiles: Vec<LanguageProfile>,
}

impl Registry {
    /// Registry with every built-in profile on its default image.
    pub fn builtin() -> Self {
        Self::with_images(&HashMap::new())
    }

    /// Builds the registry, taking image references from `images`
    /// (canonical id -> image) where present.
    pub fn with_images(images: &HashMap<String, String>) -> Self {
        let profiles = BUILTIN
            .iter()
            .map(|b| {
                let image = images
                    .get(b.id)
                    .cloned()
                    .unwrap_or_else(|| b.default_image.to_string());
                if image != b.default_image {
                    debug!("Image override for {}: {image}", b.id);
                }
                LanguageProfile {
                    id: b.id,
                    file_extension: b.file_extension,
                    image,
                    mount_target: b.mount_target,
                    command: b.command,
                    compiled: b.compiled,
                    auxiliary_files: b.auxiliary_files.to_vec(),
                }
            })
            .collect();

        Self { profiles }
    }

    /// Looks up a profile by identifier or alias (case-insensitive).
    pub fn resolve(&self, language: &str) -> Result<&LanguageProfile, ExecutionError> {
        canonical_id(language)
            .and_then(|id| self.profiles.iter().find(|p| p.id == id))
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))
    }

    /// Supported canonical ids, in table order.
    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.iter().map(|p| p.id)
    }

    pub fn profiles(&self) -> &[LanguageProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
