//! Closure-backed module (`ModuleFn`).
//!
//! Wraps a closure `F: Fn(ModuleCtx, CancellationToken) -> Fut` as a full
//! [`Module`] with no-op initialization and the default cleanup. Each
//! start produces a fresh future owning its own state; shared state goes
//! through an explicit `Arc` inside the closure.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use swarmvisor::{ModuleFn, ModuleRef};
//!
//! let heartbeat: ModuleRef = ModuleFn::arc("heartbeat", |ctx, cancel| async move {
//!     while !cancel.is_cancelled() {
//!         ctx.publish("heartbeat.tick", serde_json::json!({})).await;
//!         tokio::select! {
//!             _ = cancel.cancelled() => break,
//!             _ = tokio::time::sleep(Duration::from_secs(1)) => {}
//!         }
//!     }
//!     Ok(())
//! });
//! assert_eq!(heartbeat.name(), "heartbeat");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ModuleError;
use crate::modules::module::{Module, ModuleCtx};

/// Shared handle to a module instance.
pub type ModuleRef = Arc<dyn Module>;

/// Function-backed module implementation.
pub struct ModuleFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F, Fut> ModuleFn<F>
where
    F: Fn(ModuleCtx, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ModuleError>> + Send + 'static,
{
    /// Creates a new function-backed module.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the module and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Module for ModuleFn<F>
where
    F: Fn(ModuleCtx, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ModuleError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, _ctx: &ModuleCtx) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn run(&self, ctx: ModuleCtx, cancel: CancellationToken) -> Result<(), ModuleError> {
        (self.f)(ctx, cancel).await
    }
}
