//! Module lifecycle states.

use serde::Serialize;

/// Lifecycle state of a single module.
///
/// Transitions are monotonic forward (`Discovered → Initialized → Started
/// → Stopped`) except that any state may move to `Error`. `Error` is
/// terminal for that module: the supervisor excludes it from further
/// lifecycle calls, and the other modules are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Descriptor resolved, instance constructed, nothing called yet.
    Discovered,
    /// `initialize()` completed; subscriptions and config keys registered.
    Initialized,
    /// Run loop spawned.
    Started,
    /// Run loop joined and cleanup executed.
    Stopped,
    /// Failed during initialization or inside the run loop. Terminal.
    Error,
}

impl ModuleState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModuleState::Discovered => "discovered",
            ModuleState::Initialized => "initialized",
            ModuleState::Started => "started",
            ModuleState::Stopped => "stopped",
            ModuleState::Error => "error",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}
