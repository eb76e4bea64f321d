//! # Supervisor: the top-level orchestrator.
//!
//! The supervisor owns the one [`EventBus`] and one [`ConfigStore`] of the
//! process, discovers modules through the [`Registry`], drives each
//! through its lifecycle, and executes the shutdown sequence exactly once
//! on every exit path.
//!
//! ## High-level flow
//! ```text
//! run():
//!   arm signal listener (once, repeated run()/signals are harmless)
//!   Loading:
//!     Registry::discover()            per-directory errors skipped
//!     Registry::resolve(descriptor)   failures disable that module only
//!     ModuleRuntime::initialize()     failures mark Error, excluded below
//!     ModuleRuntime::start()          in descriptor order
//!   Running:
//!     block until the shutdown token cancels
//!       ├─ OS signal (INT/TERM/QUIT)
//!       ├─ request_shutdown()         admin endpoint, embedder, tests
//!       └─ panic in the supervisor itself → RuntimeError (non-zero exit)
//!   ShuttingDown (exactly once, even under repeated signals):
//!     stop() started modules in reverse start order (grace, then force)
//!     EventBus::shutdown()            pendings resolved, dispatch drained
//!     ConfigStore::close()            final flush
//!   Stopped
//! ```
//!
//! Modules observe lifecycle through ordinary bus topics:
//! `kernel.module.<name>.started`, `kernel.module.<name>.stopped`,
//! `kernel.module.<name>.error`, and `kernel.shutdown`. Collaborators such
//! as a web layer get no privileged API; an administrative stop endpoint
//! simply calls [`Supervisor::request_shutdown`].
//!
//! ## Example
//! ```no_run
//! use swarmvisor::{FactorySet, KernelConfig, ModuleFn, ModuleRef, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factories = FactorySet::new().with("Heartbeat", |d| {
//!         Ok(ModuleFn::arc(d.name.clone(), |_ctx, cancel| async move {
//!             cancel.cancelled().await;
//!             Ok(())
//!         }) as ModuleRef)
//!     });
//!
//!     let supervisor = Supervisor::new(KernelConfig::default(), factories);
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use futures::FutureExt;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::core::config::KernelConfig;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Event, EventBus};
use crate::modules::{ModuleCtx, ModuleRuntime, ModuleState};
use crate::registry::{FactorySet, Registry};

/// State of the whole kernel process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelState {
    /// Constructed, `run()` not called yet.
    Idle,
    /// Discovering, resolving, and initializing modules.
    Loading,
    /// Modules started; waiting for a shutdown trigger.
    Running,
    /// Executing the shutdown sequence.
    ShuttingDown,
    /// Shutdown sequence finished.
    Stopped,
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            KernelState::Idle => "idle",
            KernelState::Loading => "loading",
            KernelState::Running => "running",
            KernelState::ShuttingDown => "shutting_down",
            KernelState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Observable status of one managed module, for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    /// Module name.
    pub name: String,
    /// Grouping label from the manifest.
    pub category: String,
    /// Lifecycle state.
    pub state: ModuleState,
    /// True while the run loop is executing.
    pub running: bool,
}

#[derive(Clone)]
struct ModuleEntry {
    runtime: ModuleRuntime,
    category: String,
}

/// Top-level orchestrator over one bus, one config store, and the modules
/// discovered under [`KernelConfig::modules_dir`].
pub struct Supervisor {
    cfg: KernelConfig,
    bus: EventBus,
    config: ConfigStore,
    registry: Registry,
    modules: Mutex<Vec<ModuleEntry>>,
    state: Mutex<KernelState>,
    shutdown: CancellationToken,
    signals_armed: AtomicBool,
    finished: AtomicBool,
}

impl Supervisor {
    /// Creates a supervisor: builds the bus, opens the config store, and
    /// prepares the registry with the embedder's factories.
    pub fn new(cfg: KernelConfig, factories: FactorySet) -> Self {
        let bus = EventBus::new(cfg.dispatch_limit, cfg.pattern_cache);
        let config = ConfigStore::load(&cfg.config_path, bus.clone());
        let registry = Registry::new(&cfg.modules_dir, factories);
        Self {
            cfg,
            bus,
            config,
            registry,
            modules: Mutex::new(Vec::new()),
            state: Mutex::new(KernelState::Idle),
            shutdown: CancellationToken::new(),
            signals_armed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// The process-wide event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The process-wide config store.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Current kernel state.
    pub fn state(&self) -> KernelState {
        *self.state.lock()
    }

    /// Status snapshot of every managed module.
    pub fn statuses(&self) -> Vec<ModuleStatus> {
        self.modules
            .lock()
            .iter()
            .map(|entry| ModuleStatus {
                name: entry.runtime.name().to_string(),
                category: entry.category.clone(),
                state: entry.runtime.state(),
                running: entry.runtime.is_running(),
            })
            .collect()
    }

    /// Requests shutdown, exactly as a termination signal would.
    /// Idempotent; safe from any task (an admin HTTP handler, a test).
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Boots the kernel and blocks until shutdown.
    ///
    /// Per-module failures are contained and logged; the only `Err` this
    /// returns is a failure of the orchestration itself, after the
    /// shutdown sequence has run. The embedding binary maps it to a
    /// non-zero exit.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        if self.state() != KernelState::Idle {
            warn!("run() called again in state {}, ignoring", self.state());
            return Ok(());
        }
        if !self.signals_armed.swap(true, AtomicOrdering::SeqCst) {
            shutdown::arm(self.shutdown.clone());
        }

        let outcome = match std::panic::AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(result) => result,
            Err(_panic) => Err(RuntimeError::fatal("panic in supervisor run loop")),
        };
        if let Err(err) = &outcome {
            error!("supervisor error: {err}");
        }

        // The one shutdown path: runs whether we got here by signal,
        // explicit request, or a supervisor failure.
        self.finish().await;
        outcome
    }

    /// Loading and Running phases.
    async fn drive(&self) -> Result<(), RuntimeError> {
        self.set_state(KernelState::Loading);
        info!("supervisor starting");

        for descriptor in self.registry.discover() {
            match self.registry.resolve(&descriptor) {
                Ok(module) => {
                    let ctx =
                        ModuleCtx::new(&descriptor.name, self.bus.clone(), self.config.clone());
                    self.modules.lock().push(ModuleEntry {
                        runtime: ModuleRuntime::new(module, ctx),
                        category: descriptor.category,
                    });
                }
                Err(err) => warn!("module '{}' disabled: {err}", descriptor.name),
            }
        }

        let entries: Vec<ModuleEntry> = self.modules.lock().clone();
        for entry in &entries {
            // Failures are contained: the runtime is already in Error
            // state and drops out of the start pass below.
            let _ = entry.runtime.initialize().await;
        }

        let mut started = 0usize;
        for entry in &entries {
            if entry.runtime.state() == ModuleState::Initialized {
                entry.runtime.start();
                self.publish_lifecycle(entry, "started").await;
                started += 1;
            }
        }

        self.set_state(KernelState::Running);
        info!("supervisor running with {started} module(s)");
        self.shutdown.cancelled().await;
        Ok(())
    }

    /// The shutdown sequence. Guarded so it executes exactly once even
    /// under repeated signals or a failure in the run loop.
    async fn finish(&self) {
        if self.finished.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        self.set_state(KernelState::ShuttingDown);
        info!("shutdown initiated, stopping modules");
        self.bus
            .publish(Event::new("kernel.shutdown", json!({}), "kernel"))
            .await;

        let entries: Vec<ModuleEntry> = self.modules.lock().clone();
        for entry in entries.iter().rev() {
            let was_started = entry.runtime.state() == ModuleState::Started;
            entry.runtime.stop(self.cfg.grace).await;
            if was_started {
                self.publish_lifecycle(entry, "stopped").await;
            }
        }

        self.bus.shutdown().await;
        self.config.close();
        self.set_state(KernelState::Stopped);
        info!("supervisor stopped");
    }

    async fn publish_lifecycle(&self, entry: &ModuleEntry, phase: &str) {
        let name = entry.runtime.name();
        self.bus
            .publish(Event::new(
                format!("kernel.module.{name}.{phase}"),
                json!({ "module": name, "category": entry.category }),
                "kernel",
            ))
            .await;
    }

    fn set_state(&self, next: KernelState) {
        *self.state.lock() = next;
    }
}
