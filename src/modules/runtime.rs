//! # ModuleRuntime: drives one module through its state machine.
//!
//! The runtime owns the pieces the module itself must not: the spawned
//! run-loop task, its cancellation token, and the state transitions.
//!
//! ```text
//! Discovered ──initialize()──► Initialized ──start()──► Started
//!                                                          │ stop(grace)
//!                                                          ▼
//!     (any phase, on error/panic) ──► Error            Stopped
//! ```
//!
//! ## Rules
//! - `initialize()` and the run loop are panic-isolated; a failure moves
//!   the module to `Error`, runs its cleanup hook, and leaves every other
//!   module untouched.
//! - `stop(grace)` cancels the token, waits up to `grace` for a voluntary
//!   exit, then force-aborts the task. The cleanup hook runs in every
//!   case. Stopping a module that never started is a no-op; stop is
//!   idempotent.
//! - The module signals its own liveness: `is_running()` is true only
//!   while the run loop is actually executing.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::Event;
use crate::modules::module::ModuleCtx;
use crate::modules::module_fn::ModuleRef;
use crate::modules::state::ModuleState;

struct RuntimeInner {
    module: ModuleRef,
    ctx: ModuleCtx,
    state: Mutex<ModuleState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    cleaned: AtomicBool,
}

/// Kernel-side handle for one module instance. Cheap to clone.
#[derive(Clone)]
pub struct ModuleRuntime {
    inner: Arc<RuntimeInner>,
}

impl ModuleRuntime {
    /// Wraps a freshly constructed module in the `Discovered` state.
    pub fn new(module: ModuleRef, ctx: ModuleCtx) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                module,
                ctx,
                state: Mutex::new(ModuleState::Discovered),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                running: AtomicBool::new(false),
                cleaned: AtomicBool::new(false),
            }),
        }
    }

    /// The module's name (as the kernel addresses it).
    pub fn name(&self) -> &str {
        self.inner.ctx.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        *self.inner.state.lock()
    }

    /// True while the run loop is executing.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(AtomicOrdering::SeqCst)
    }

    /// Runs the module's `initialize()` hook once.
    ///
    /// A failure or panic moves the module to `Error`, runs its cleanup
    /// hook, and is reported to the caller; the caller keeps going with
    /// the sibling modules.
    pub async fn initialize(&self) -> Result<(), crate::ModuleError> {
        if self.state() != ModuleState::Discovered {
            warn!("initialize() on module '{}' ignored in state {}", self.name(), self.state());
            return Ok(());
        }

        let hook = self.inner.module.initialize(&self.inner.ctx);
        match std::panic::AssertUnwindSafe(hook).catch_unwind().await {
            Ok(Ok(())) => {
                self.inner.set_state(ModuleState::Initialized);
                debug!("module '{}' initialized", self.name());
                Ok(())
            }
            Ok(Err(err)) => {
                error!("module '{}' failed to initialize: {err}", self.name());
                self.inner.set_state(ModuleState::Error);
                self.inner.cleanup_once().await;
                Err(err)
            }
            Err(_panic) => {
                error!("module '{}' panicked during initialize", self.name());
                self.inner.set_state(ModuleState::Error);
                self.inner.cleanup_once().await;
                Err(crate::ModuleError::init("panicked during initialize"))
            }
        }
    }

    /// Spawns the module's run loop and returns immediately.
    ///
    /// Only valid from `Initialized`; anything else is logged and skipped
    /// (the supervisor never calls start on an `Error` module, but a
    /// defect in the embedder must not panic the kernel).
    pub fn start(&self) {
        if self.state() != ModuleState::Initialized {
            warn!("start() on module '{}' ignored in state {}", self.name(), self.state());
            return;
        }

        let inner = Arc::clone(&self.inner);
        inner.running.store(true, AtomicOrdering::SeqCst);
        let cancel = inner.cancel.clone();
        let handle = tokio::spawn(async move {
            let name = inner.ctx.name().to_string();
            let loop_future = inner.module.run(inner.ctx.clone(), cancel);
            let result = std::panic::AssertUnwindSafe(loop_future).catch_unwind().await;
            inner.running.store(false, AtomicOrdering::SeqCst);

            match result {
                Ok(Ok(())) => debug!("module '{name}' run loop exited"),
                Ok(Err(err)) if err.is_canceled() => {
                    debug!("module '{name}' run loop cancelled")
                }
                Ok(Err(err)) => {
                    error!("module '{name}' run loop failed: {err}");
                    inner.fail(&name, err.to_string()).await;
                }
                Err(_panic) => {
                    error!("module '{name}' run loop panicked");
                    inner.fail(&name, "panic in run loop".to_string()).await;
                }
            }
        });

        *self.inner.task.lock() = Some(handle);
        self.inner.set_state(ModuleState::Started);
        info!("module '{}' started", self.name());
    }

    /// Stops the module: cancel, wait up to `grace`, force-abort, cleanup.
    ///
    /// No-op for a module that never started; idempotent afterwards.
    pub async fn stop(&self, grace: Duration) {
        let handle = self.inner.task.lock().take();
        if handle.is_none() {
            if self.state() == ModuleState::Started {
                // Started but the handle is gone: a concurrent stop owns it.
                return;
            }
            debug!("stop() on module '{}' is a no-op in state {}", self.name(), self.state());
            return;
        }

        info!("stopping module '{}'", self.name());
        self.inner.cancel.cancel();

        if let Some(mut handle) = handle {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(_) => {}
                Err(_elapsed) => {
                    warn!(
                        "module '{}' did not stop within {grace:?}, forcing cancellation",
                        self.name()
                    );
                    handle.abort();
                    let _ = handle.await;
                    self.inner.running.store(false, AtomicOrdering::SeqCst);
                }
            }
        }

        self.inner.cleanup_once().await;
        {
            let mut state = self.inner.state.lock();
            if *state != ModuleState::Error {
                *state = ModuleState::Stopped;
            }
        }
        info!("module '{}' stopped", self.name());
    }
}

impl RuntimeInner {
    fn set_state(&self, next: ModuleState) {
        *self.state.lock() = next;
    }

    /// Terminal failure path of the run loop: mark `Error`, run cleanup,
    /// announce on the bus.
    async fn fail(&self, name: &str, reason: String) {
        self.set_state(ModuleState::Error);
        self.cleanup_once().await;
        self.ctx
            .bus()
            .publish(Event::new(
                format!("kernel.module.{name}.error"),
                json!({ "module": name, "reason": reason }),
                "kernel",
            ))
            .await;
    }

    /// Runs the module's cleanup hook at most once, swallowing its errors.
    async fn cleanup_once(&self) {
        if self.cleaned.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let hook = self.module.cleanup(&self.ctx);
        match std::panic::AssertUnwindSafe(hook).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("cleanup of module '{}' failed: {err}", self.ctx.name()),
            Err(_panic) => warn!("cleanup of module '{}' panicked", self.ctx.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::error::ModuleError;
    use crate::events::{EventBus, Handler};
    use crate::modules::module_fn::ModuleFn;

    fn test_ctx(name: &str) -> (ModuleCtx, EventBus, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::default();
        let config = ConfigStore::load(dir.path().join("config.json"), bus.clone());
        (ModuleCtx::new(name, bus.clone(), config), bus, dir)
    }

    fn idle_module(name: &'static str) -> ModuleRef {
        ModuleFn::arc(name, |_ctx, cancel| async move {
            cancel.cancelled().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let (ctx, _bus, _dir) = test_ctx("idle");
        let rt = ModuleRuntime::new(idle_module("idle"), ctx);
        assert_eq!(rt.state(), ModuleState::Discovered);

        rt.initialize().await.unwrap();
        assert_eq!(rt.state(), ModuleState::Initialized);

        rt.start();
        assert_eq!(rt.state(), ModuleState::Started);
        tokio::task::yield_now().await;
        assert!(rt.is_running());

        rt.stop(Duration::from_secs(1)).await;
        assert_eq!(rt.state(), ModuleState::Stopped);
        assert!(!rt.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (ctx, _bus, _dir) = test_ctx("never");
        let rt = ModuleRuntime::new(idle_module("never"), ctx);
        rt.stop(Duration::from_secs(1)).await;
        assert_eq!(rt.state(), ModuleState::Discovered);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (ctx, _bus, _dir) = test_ctx("twice");
        let rt = ModuleRuntime::new(idle_module("twice"), ctx);
        rt.initialize().await.unwrap();
        rt.start();
        rt.stop(Duration::from_secs(1)).await;
        rt.stop(Duration::from_secs(1)).await;
        assert_eq!(rt.state(), ModuleState::Stopped);
    }

    #[tokio::test]
    async fn test_init_failure_marks_error_and_unsubscribes() {
        struct Faulty;
        #[async_trait::async_trait]
        impl crate::Module for Faulty {
            fn name(&self) -> &str {
                "faulty"
            }
            async fn initialize(&self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
                ctx.subscribe("f.topic", Handler::inline(|_| async { Ok(None) }));
                Err(ModuleError::init("no credentials"))
            }
            async fn run(
                &self,
                _ctx: ModuleCtx,
                _cancel: CancellationToken,
            ) -> Result<(), ModuleError> {
                Ok(())
            }
        }

        let (ctx, bus, _dir) = test_ctx("faulty");
        let rt = ModuleRuntime::new(Arc::new(Faulty), ctx);
        assert!(rt.initialize().await.is_err());
        assert_eq!(rt.state(), ModuleState::Error);
        // Default cleanup dropped the half-registered subscription.
        assert_eq!(bus.subscription_count(), 0);

        // Error is terminal: start is refused.
        rt.start();
        assert_eq!(rt.state(), ModuleState::Error);
    }

    #[tokio::test]
    async fn test_run_error_moves_to_error_state() {
        let (ctx, _bus, _dir) = test_ctx("crashy");
        let module = ModuleFn::arc("crashy", |_ctx, _cancel| async {
            Err(ModuleError::runtime("exploded"))
        });
        let rt = ModuleRuntime::new(module, ctx);
        rt.initialize().await.unwrap();
        rt.start();

        // Give the spawned loop time to fail.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rt.state(), ModuleState::Error);
        assert!(!rt.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_module_is_force_cancelled() {
        let (ctx, _bus, _dir) = test_ctx("stubborn");
        // Ignores its token entirely.
        let module = ModuleFn::arc("stubborn", |_ctx, _cancel| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let rt = ModuleRuntime::new(module, ctx);
        rt.initialize().await.unwrap();
        rt.start();

        let started = tokio::time::Instant::now();
        rt.stop(Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(rt.state(), ModuleState::Stopped);
        assert!(!rt.is_running());
    }
}
