//! Error types used by the kernel, grouped by the scope that absorbs them.
//!
//! Each enum maps to one containment boundary:
//!
//! - [`DescriptorError`] — a single module directory failed discovery; the
//!   directory is skipped and discovery continues.
//! - [`ResolutionError`] — a descriptor could not be turned into a live
//!   module; that module is disabled, siblings are unaffected.
//! - [`ModuleError`] — a module failed during `initialize()` or inside its
//!   run loop; the module is marked `Error`, siblings are unaffected.
//! - [`CallbackError`] — a bus subscriber failed during dispatch; logged and
//!   excluded from the result set, never fails the publish.
//! - [`RuntimeError`] — the orchestration layer itself failed. This is the
//!   only error that terminates the whole process.
//!
//! All types provide `as_label()` for stable log/metric labels.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading a module directory's manifest.
///
/// A descriptor error disables exactly one module directory; the registry
/// logs it and keeps scanning the remaining directories.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// The directory has no manifest file at all.
    #[error("no manifest file in {dir}")]
    ManifestMissing {
        /// The module directory that was scanned.
        dir: PathBuf,
    },

    /// The manifest exists but could not be read or parsed.
    #[error("unreadable manifest {path}: {reason}")]
    ManifestInvalid {
        /// Path of the offending manifest file.
        path: PathBuf,
        /// Parse or I/O failure description.
        reason: String,
    },

    /// A required manifest field is absent or empty.
    #[error("manifest {path} is missing required field '{field}'")]
    MissingField {
        /// Path of the offending manifest file.
        path: PathBuf,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The manifest's entry reference does not exist on disk.
    #[error("entry file {path} referenced by manifest does not exist")]
    EntryNotFound {
        /// Resolved entry path that was checked.
        path: PathBuf,
    },
}

impl DescriptorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DescriptorError::ManifestMissing { .. } => "manifest_missing",
            DescriptorError::ManifestInvalid { .. } => "manifest_invalid",
            DescriptorError::MissingField { .. } => "manifest_missing_field",
            DescriptorError::EntryNotFound { .. } => "entry_not_found",
        }
    }
}

/// Errors produced while resolving a descriptor to a module instance.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The manifest names a symbol that no registered factory provides.
    #[error("module '{module}': no factory registered for symbol '{symbol}'")]
    UnknownSymbol {
        /// Module name from the descriptor.
        module: String,
        /// The unresolvable symbol.
        symbol: String,
    },

    /// A factory was found but failed to build the module.
    #[error("module '{module}': factory failed: {reason}")]
    BuildFailed {
        /// Module name from the descriptor.
        module: String,
        /// Factory failure description.
        reason: String,
    },
}

impl ResolutionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolutionError::UnknownSymbol { .. } => "unknown_symbol",
            ResolutionError::BuildFailed { .. } => "build_failed",
        }
    }
}

/// Errors produced by a module's own lifecycle code.
///
/// `Canceled` is the cooperative-shutdown exit and is treated as graceful;
/// the other variants move the module to its terminal `Error` state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ModuleError {
    /// `initialize()` failed; the module is excluded from start.
    #[error("initialization failed: {reason}")]
    Init {
        /// Failure description.
        reason: String,
    },

    /// The run loop failed after start.
    #[error("run loop failed: {reason}")]
    Runtime {
        /// Failure description.
        reason: String,
    },

    /// The run loop observed cancellation and exited voluntarily.
    #[error("cancelled")]
    Canceled,
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Init`].
    pub fn init(reason: impl Into<String>) -> Self {
        ModuleError::Init {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ModuleError::Runtime`].
    pub fn runtime(reason: impl Into<String>) -> Self {
        ModuleError::Runtime {
            reason: reason.into(),
        }
    }

    /// True for the graceful cooperative-shutdown exit.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ModuleError::Canceled)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModuleError::Init { .. } => "module_init_failed",
            ModuleError::Runtime { .. } => "module_runtime_failed",
            ModuleError::Canceled => "module_canceled",
        }
    }
}

/// Error returned by a bus subscriber's handler.
///
/// Dispatch logs it with the owning module and topic, drops the handler's
/// result, and carries on with the remaining subscribers.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct CallbackError {
    /// Failure description.
    pub message: String,
}

impl CallbackError {
    /// Creates a callback error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Errors produced by the supervisor's own orchestration code.
///
/// Module failures never surface here; this is the one error class that is
/// fatal to the process (the embedding binary maps it to a non-zero exit).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The supervisor's run loop failed outside any module.
    #[error("supervisor failed: {reason}")]
    Fatal {
        /// Failure description.
        reason: String,
    },
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        RuntimeError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Fatal { .. } => "supervisor_fatal",
        }
    }
}
