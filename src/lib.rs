//! # swarmvisor
//!
//! **swarmvisor** is the in-process orchestration kernel for an
//! AI-streaming backend. It wires independently-lifecycled modules (LLM,
//! TTS, ASR, chat bridges, front ends) together through three primitives:
//! a wildcard-routed event bus, a persistent module-scoped config store,
//! and a supervisor that discovers, starts, and stops the modules.
//!
//! Everything is single-host and in-process: no distributed messaging, no
//! event persistence, no cross-topic ordering guarantees.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  modules/llm │   │  modules/tts │   │ modules/chat │
//!     │ module.json  │   │ module.json  │   │ module.json  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Registry (manifest discovery, symbol → factory resolution)     │
//! │  - ModuleRuntime per module (state machine, cancellable loop)     │
//! │  - owns the one EventBus and the one ConfigStore                  │
//! │  - OS signals / request_shutdown() → exactly-once shutdown        │
//! └──────┬──────────────────────┬─────────────────────────┬──────────┘
//!        ▼                      ▼                         ▼
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────────────┐
//! │  EventBus   │   │     ConfigStore      │   │   ModuleCtx (DI)     │
//! │ exact map + │   │ module → key → value │   │ injected bus+config  │
//! │ wildcard    │◄──┤ JSON file, notifies  │   │ handles per module   │
//! │ fan-out,    │   │ on "<module>.<key>"  │   └──────────────────────┘
//! │ request/    │   └──────────────────────┘
//! │ response    │
//! └─────────────┘
//! ```
//!
//! ### Module lifecycle
//! ```text
//! Discovered ──initialize()──► Initialized ──start()──► Started
//!     (register subscriptions        (spawn run loop)      │
//!      and config keys)                                    │ stop(grace)
//!                                                          ▼
//!     any phase, on error/panic ──► Error (terminal)    Stopped
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                  |
//! |-----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Pub/sub**     | Topic-routed fan-out with `*`/`?` wildcards              | [`EventBus`], [`Event`], [`Handler`]       |
//! | **Request**     | Correlated request/response over the broadcast bus       | [`RequestOutcome`]                         |
//! | **Config**      | Durable module-scoped settings with change notification  | [`ConfigStore`]                            |
//! | **Discovery**   | Manifest-driven module loading                           | [`Registry`], [`ModuleDescriptor`], [`FactorySet`] |
//! | **Lifecycle**   | Initialize/start/stop with grace and error containment   | [`Module`], [`ModuleRuntime`], [`Supervisor`] |
//! | **Errors**      | One enum per containment scope                           | [`ModuleError`], [`RuntimeError`]          |
//!
//! ## Example
//! ```no_run
//! use serde_json::json;
//! use swarmvisor::{
//!     FactorySet, Handler, KernelConfig, ModuleFn, ModuleRef, Supervisor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The embedding application registers one factory per manifest
//!     // symbol; modules/<dir>/module.json picks which one to build.
//!     let factories = FactorySet::new().with("EchoModule", |d| {
//!         Ok(ModuleFn::arc(d.name.clone(), |ctx, cancel| async move {
//!             ctx.subscribe("echo.say", Handler::inline(|ev| async move {
//!                 Ok(Some(ev.payload.clone()))
//!             }));
//!             cancel.cancelled().await;
//!             Ok(())
//!         }) as ModuleRef)
//!     });
//!
//!     let supervisor = Supervisor::new(KernelConfig::default(), factories);
//!     // Blocks until SIGINT/SIGTERM or supervisor.request_shutdown().
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod modules;
mod registry;
mod topics;

// ---- Public re-exports ----

pub use crate::core::{KernelConfig, KernelState, ModuleStatus, Supervisor};
pub use config::{config_topic, ConfigStore};
pub use error::{CallbackError, DescriptorError, ModuleError, ResolutionError, RuntimeError};
pub use events::{Event, EventBus, Handler, HandlerResult, RequestOutcome};
pub use modules::{Module, ModuleCtx, ModuleFn, ModuleRef, ModuleRuntime, ModuleState};
pub use registry::{FactorySet, ModuleDescriptor, ModuleFactory, ModuleManifest, Registry, MANIFEST_FILE};
pub use topics::{PatternCache, TopicPattern};
