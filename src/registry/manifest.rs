//! Parsing of per-module manifest files.
//!
//! A manifest is a flat JSON object with four required string fields:
//!
//! ```json
//! {
//!   "name": "tts",
//!   "category": "output",
//!   "entry": "tts.rs",
//!   "symbol": "TtsModule"
//! }
//! ```
//!
//! `entry` is relative to the module directory and must exist on disk;
//! `symbol` names the factory the embedding application registered for
//! this module.

use std::path::Path;

use serde::Deserialize;

use crate::error::DescriptorError;

/// Manifest file name expected in every module directory.
pub const MANIFEST_FILE: &str = "module.json";

/// Loose shape used during parsing so each missing field gets its own
/// precise error instead of a generic serde message.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    category: Option<String>,
    entry: Option<String>,
    symbol: Option<String>,
}

/// A validated module manifest.
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    /// Module name; also keys the module's config section.
    pub name: String,
    /// Grouping label (`"input"`, `"output"`, `"plugin"`, ...).
    pub category: String,
    /// Entry reference, relative to the module directory.
    pub entry: String,
    /// Exported factory symbol to resolve.
    pub symbol: String,
}

impl ModuleManifest {
    /// Reads and validates the manifest inside `dir`.
    pub fn load(dir: &Path) -> Result<Self, DescriptorError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(DescriptorError::ManifestMissing {
                dir: dir.to_path_buf(),
            });
        }

        let text =
            std::fs::read_to_string(&path).map_err(|err| DescriptorError::ManifestInvalid {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        let raw: RawManifest =
            serde_json::from_str(&text).map_err(|err| DescriptorError::ManifestInvalid {
                path: path.clone(),
                reason: err.to_string(),
            })?;

        let field = |value: Option<String>, name: &'static str| {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(DescriptorError::MissingField {
                    path: path.clone(),
                    field: name,
                }),
            }
        };

        Ok(Self {
            name: field(raw.name, "name")?,
            category: field(raw.category, "category")?,
            entry: field(raw.entry, "entry")?,
            symbol: field(raw.symbol, "symbol")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn test_valid_manifest_parses() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name": "echo", "category": "plugin", "entry": "echo.rs", "symbol": "Echo"}"#,
        );
        let m = ModuleManifest::load(dir.path()).unwrap();
        assert_eq!(m.name, "echo");
        assert_eq!(m.symbol, "Echo");
    }

    #[test]
    fn test_missing_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModuleManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.as_label(), "manifest_missing");
    }

    #[test]
    fn test_missing_required_field() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name": "echo", "category": "plugin", "symbol": "Echo"}"#,
        );
        let err = ModuleManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.as_label(), "manifest_missing_field");
        assert!(err.to_string().contains("entry"));
    }

    #[test]
    fn test_empty_field_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name": "  ", "category": "plugin", "entry": "e.rs", "symbol": "E"}"#,
        );
        let err = ModuleManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.as_label(), "manifest_missing_field");
    }

    #[test]
    fn test_garbage_manifest_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "not json at all");
        let err = ModuleManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.as_label(), "manifest_invalid");
    }
}
