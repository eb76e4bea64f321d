//! Immutable description of a discoverable module.

use std::path::{Path, PathBuf};

use crate::error::DescriptorError;
use crate::registry::manifest::ModuleManifest;

/// The manifest-derived description of a module, prior to resolution.
///
/// Produced once per discovery pass and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Module name.
    pub name: String,
    /// Grouping label from the manifest.
    pub category: String,
    /// Absolute path of the entry reference (validated to exist).
    pub entry: PathBuf,
    /// Factory symbol to resolve.
    pub symbol: String,
    /// The module directory the manifest came from.
    pub dir: PathBuf,
}

impl ModuleDescriptor {
    /// Builds a descriptor from a parsed manifest, checking that the entry
    /// reference exists on disk.
    pub fn from_manifest(manifest: ModuleManifest, dir: &Path) -> Result<Self, DescriptorError> {
        let entry = dir.join(&manifest.entry);
        if !entry.exists() {
            return Err(DescriptorError::EntryNotFound { path: entry });
        }
        Ok(Self {
            name: manifest.name,
            category: manifest.category,
            entry,
            symbol: manifest.symbol,
            dir: dir.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ModuleManifest {
            name: "ghost".into(),
            category: "plugin".into(),
            entry: "missing.rs".into(),
            symbol: "Ghost".into(),
        };
        let err = ModuleDescriptor::from_manifest(manifest, dir.path()).unwrap_err();
        assert_eq!(err.as_label(), "entry_not_found");
    }

    #[test]
    fn test_entry_path_is_resolved_against_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "").unwrap();
        let manifest = ModuleManifest {
            name: "real".into(),
            category: "plugin".into(),
            entry: "main.rs".into(),
            symbol: "Real".into(),
        };
        let d = ModuleDescriptor::from_manifest(manifest, dir.path()).unwrap();
        assert_eq!(d.entry, dir.path().join("main.rs"));
        assert_eq!(d.dir, dir.path());
    }
}
