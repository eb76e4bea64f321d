//! # Registry: manifest discovery and symbol resolution.
//!
//! ## Rules
//! - Only the **immediate** subdirectories of the modules root are
//!   scanned; nesting is a module's own business.
//! - Directory names starting with `_` or `.` are reserved and skipped.
//! - A broken directory (missing manifest, missing field, dangling entry)
//!   is logged and skipped; discovery of the siblings continues.
//! - Descriptors are returned sorted by name so start order is stable
//!   across runs.

use std::path::PathBuf;

use log::{info, warn};

use crate::error::ResolutionError;
use crate::modules::ModuleRef;
use crate::registry::descriptor::ModuleDescriptor;
use crate::registry::factory::FactorySet;
use crate::registry::manifest::ModuleManifest;

/// Discovers module descriptors on disk and resolves them to instances.
pub struct Registry {
    root: PathBuf,
    factories: FactorySet,
}

impl Registry {
    /// Creates a registry over `root` with the given factories.
    pub fn new(root: impl Into<PathBuf>, factories: FactorySet) -> Self {
        Self {
            root: root.into(),
            factories,
        }
    }

    /// The modules root directory.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Walks the modules root and returns every valid descriptor.
    ///
    /// Never fails: a missing root or unreadable directory yields an empty
    /// list with a warning.
    pub fn discover(&self) -> Vec<ModuleDescriptor> {
        if !self.root.exists() {
            warn!("modules directory {} does not exist", self.root.display());
            return Vec::new();
        }
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "cannot read modules directory {}: {err}",
                    self.root.display()
                );
                return Vec::new();
            }
        };

        let mut descriptors = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if dir_name.starts_with('_') || dir_name.starts_with('.') {
                continue;
            }

            let descriptor = ModuleManifest::load(&dir)
                .and_then(|manifest| ModuleDescriptor::from_manifest(manifest, &dir));
            match descriptor {
                Ok(descriptor) => {
                    info!(
                        "discovered module '{}' (category '{}') in {}",
                        descriptor.name,
                        descriptor.category,
                        dir.display()
                    );
                    descriptors.push(descriptor);
                }
                Err(err) => {
                    warn!("skipping module directory {}: {err}", dir.display());
                }
            }
        }

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Resolves a descriptor's symbol to a live module instance.
    ///
    /// A failure disables that one module; siblings are unaffected.
    pub fn resolve(&self, descriptor: &ModuleDescriptor) -> Result<ModuleRef, ResolutionError> {
        let factory =
            self.factories
                .get(&descriptor.symbol)
                .ok_or_else(|| ResolutionError::UnknownSymbol {
                    module: descriptor.name.clone(),
                    symbol: descriptor.symbol.clone(),
                })?;
        factory(descriptor).map_err(|reason| ResolutionError::BuildFailed {
            module: descriptor.name.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleFn;
    use std::path::Path;

    fn write_module_dir(root: &Path, name: &str, manifest: &str, entry: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("module.json"), manifest).unwrap();
        if let Some(entry) = entry {
            std::fs::write(dir.join(entry), "").unwrap();
        }
    }

    fn echo_factories() -> FactorySet {
        FactorySet::new().with("Echo", |d: &ModuleDescriptor| {
            Ok(ModuleFn::arc(d.name.clone(), |_ctx, _cancel| async {
                Ok(())
            }) as ModuleRef)
        })
    }

    #[test]
    fn test_discovery_skips_broken_and_keeps_valid() {
        let root = tempfile::tempdir().unwrap();
        write_module_dir(
            root.path(),
            "good",
            r#"{"name": "good", "category": "plugin", "entry": "main.rs", "symbol": "Echo"}"#,
            Some("main.rs"),
        );
        // Missing "entry" field.
        write_module_dir(
            root.path(),
            "no_entry",
            r#"{"name": "no_entry", "category": "plugin", "symbol": "Echo"}"#,
            None,
        );
        // Entry referenced but absent on disk.
        write_module_dir(
            root.path(),
            "dangling",
            r#"{"name": "dangling", "category": "plugin", "entry": "gone.rs", "symbol": "Echo"}"#,
            None,
        );

        let registry = Registry::new(root.path(), echo_factories());
        let descriptors = registry.discover();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "good");
    }

    #[test]
    fn test_reserved_prefixes_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        for name in ["_staging", ".hidden"] {
            write_module_dir(
                root.path(),
                name,
                r#"{"name": "x", "category": "plugin", "entry": "m.rs", "symbol": "Echo"}"#,
                Some("m.rs"),
            );
        }
        let registry = Registry::new(root.path(), echo_factories());
        assert!(registry.discover().is_empty());
    }

    #[test]
    fn test_missing_root_yields_empty() {
        let registry = Registry::new("/definitely/not/here", echo_factories());
        assert!(registry.discover().is_empty());
    }

    #[test]
    fn test_descriptors_are_sorted_by_name() {
        let root = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            write_module_dir(
                root.path(),
                name,
                &format!(
                    r#"{{"name": "{name}", "category": "plugin", "entry": "m.rs", "symbol": "Echo"}}"#
                ),
                Some("m.rs"),
            );
        }
        let registry = Registry::new(root.path(), echo_factories());
        let names: Vec<String> = registry.discover().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_unknown_symbol_fails_resolution() {
        let root = tempfile::tempdir().unwrap();
        write_module_dir(
            root.path(),
            "odd",
            r#"{"name": "odd", "category": "plugin", "entry": "m.rs", "symbol": "Missing"}"#,
            Some("m.rs"),
        );
        let registry = Registry::new(root.path(), echo_factories());
        let descriptors = registry.discover();
        let err = registry.resolve(&descriptors[0]).err().unwrap();
        assert_eq!(err.as_label(), "unknown_symbol");
    }

    #[test]
    fn test_factory_failure_is_build_failed() {
        let root = tempfile::tempdir().unwrap();
        write_module_dir(
            root.path(),
            "flaky",
            r#"{"name": "flaky", "category": "plugin", "entry": "m.rs", "symbol": "Flaky"}"#,
            Some("m.rs"),
        );
        let factories = FactorySet::new()
            .with("Flaky", |_d: &ModuleDescriptor| Err("weights not found".to_string()));
        let registry = Registry::new(root.path(), factories);
        let descriptors = registry.discover();
        let err = registry.resolve(&descriptors[0]).err().unwrap();
        assert_eq!(err.as_label(), "build_failed");
    }
}
