//! # The module capability and its injected context.
//!
//! A module is an independently-lifecycled unit that talks to the rest of
//! the system only through the [`EventBus`] and [`ConfigStore`] handed to
//! it in a [`ModuleCtx`]. There is no ambient global state: the supervisor
//! owns one bus and one store and injects references at construction.
//!
//! ## Contract
//! - [`Module::initialize`] registers config keys and event subscriptions.
//!   It must not start doing work.
//! - [`Module::run`] is the main loop, spawned by the kernel. It should
//!   check its [`CancellationToken`] at every suspension point and exit
//!   promptly during shutdown (return `Ok(())` or `Err(ModuleError::Canceled)`,
//!   both count as graceful).
//! - [`Module::cleanup`] releases resources. The default implementation
//!   unsubscribes the module from the bus, which is the required minimum;
//!   overrides should call [`ModuleCtx::unsubscribe_all`] themselves.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use serde_json::json;
//! use swarmvisor::{Handler, Module, ModuleCtx, ModuleError};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Module for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!
//!     async fn initialize(&self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
//!         ctx.subscribe("greeter.hello", Handler::inline(|ev| async move {
//!             let who = ev.payload["who"].as_str().unwrap_or("stranger");
//!             Ok(Some(json!({ "reply": format!("hello {who}") })))
//!         }));
//!         ctx.register_config("greeting", json!("hello"), |_| {}).await;
//!         Ok(())
//!     }
//!
//!     async fn run(&self, _ctx: ModuleCtx, cancel: CancellationToken) -> Result<(), ModuleError> {
//!         cancel.cancelled().await;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::error::ModuleError;
use crate::events::{Event, EventBus, Handler, RequestOutcome};

/// Bus and config handles injected into a module. Cheap to clone.
///
/// Every operation is performed on behalf of the owning module: bus
/// subscriptions carry its name as owner, publishes carry it as source,
/// and config keys land in its section of the store.
#[derive(Clone)]
pub struct ModuleCtx {
    name: Arc<str>,
    bus: EventBus,
    config: ConfigStore,
}

impl ModuleCtx {
    /// Creates a context for the named module.
    pub fn new(name: impl AsRef<str>, bus: EventBus, config: ConfigStore) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            bus,
            config,
        }
    }

    /// The owning module's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The shared config store.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Subscribes a handler owned by this module.
    pub fn subscribe(&self, pattern: &str, handler: Handler) {
        self.bus.subscribe(&self.name, pattern, handler);
    }

    /// Publishes a fire-and-forget event sourced from this module.
    pub async fn publish(&self, topic: &str, payload: Value) {
        self.bus
            .publish(Event::new(topic, payload, self.name.as_ref()))
            .await;
    }

    /// Sends a correlated request sourced from this module.
    pub async fn request(&self, topic: &str, payload: Value, timeout: Duration) -> RequestOutcome {
        self.bus
            .request(topic, payload, self.name.as_ref(), timeout)
            .await
    }

    /// Registers a config key in this module's section.
    pub async fn register_config<F>(&self, key: &str, default: Value, callback: F) -> Value
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.config
            .register(&self.name, key, default, callback)
            .await
    }

    /// Reads a config value from this module's section.
    pub fn config_value(&self, key: &str, default: Value) -> Value {
        self.config.get_or(&self.name, key, default)
    }

    /// Drops every bus subscription owned by this module.
    pub fn unsubscribe_all(&self) -> usize {
        self.bus.unsubscribe(&self.name, None)
    }
}

/// The capability every pluggable unit implements.
///
/// Resolution (see [`Registry`](crate::Registry)) verifies this contract
/// by construction: a factory can only hand back something implementing
/// `Module`.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Stable module name.
    fn name(&self) -> &str;

    /// Called exactly once before start. Register config keys and bus
    /// subscriptions here; do not begin doing work yet.
    async fn initialize(&self, ctx: &ModuleCtx) -> Result<(), ModuleError>;

    /// The module's main loop, spawned by the kernel as a cancellable
    /// task. Honor `cancel` at every suspension point.
    async fn run(&self, ctx: ModuleCtx, cancel: CancellationToken) -> Result<(), ModuleError>;

    /// Releases the module's resources. Runs after the loop has exited,
    /// whether it stopped voluntarily, was force-cancelled, or failed.
    async fn cleanup(&self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
        ctx.unsubscribe_all();
        Ok(())
    }
}
