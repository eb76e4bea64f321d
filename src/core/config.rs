//! Kernel-wide configuration.
//!
//! [`KernelConfig`] centralizes the supervisor's operational settings.
//! Module-level configuration lives in the [`ConfigStore`](crate::ConfigStore)
//! instead; this type only shapes the kernel itself.

use std::path::PathBuf;
use std::time::Duration;

/// Settings for one kernel instance.
///
/// ## Field semantics
/// - `modules_dir`: root scanned for module directories
/// - `config_path`: backing file of the config store
/// - `grace`: per-module wait during stop before force-cancel
/// - `dispatch_limit`: concurrently running handlers per publish (min 1)
/// - `pattern_cache`: bound of the compiled topic pattern cache
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Directory whose immediate subdirectories are module candidates.
    pub modules_dir: PathBuf,

    /// Path of the persistent config file (created when absent).
    pub config_path: PathBuf,

    /// Maximum wait for a module's voluntary exit during `stop` before
    /// its task is force-cancelled.
    pub grace: Duration,

    /// Maximum number of subscriber handlers running concurrently within
    /// one publish. Clamped to a minimum of 1 by the bus.
    pub dispatch_limit: usize,

    /// Maximum number of compiled wildcard patterns kept in the LRU
    /// cache. Clamped to a minimum of 1 by the cache.
    pub pattern_cache: usize,
}

impl Default for KernelConfig {
    /// Default configuration:
    ///
    /// - `modules_dir = "modules"`
    /// - `config_path = "config.json"`
    /// - `grace = 5s`
    /// - `dispatch_limit = 10`
    /// - `pattern_cache = 1024`
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            config_path: PathBuf::from("config.json"),
            grace: Duration::from_secs(5),
            dispatch_limit: 10,
            pattern_cache: 1024,
        }
    }
}
