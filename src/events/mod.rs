//! The event system: bus, events, and subscriber handlers.
//!
//! ## Contents
//! - [`Event`] — the immutable unit routed by topic
//! - [`Handler`] — a subscriber callback, inline or off-loaded
//! - [`EventBus`] — wildcard-routed fan-out dispatch plus correlated
//!   request/response
//! - [`RequestOutcome`] — the three-way result of a `request()` call
//!
//! ## Quick reference
//! - **Publishers**: any module via [`ModuleCtx`](crate::ModuleCtx), the
//!   [`ConfigStore`](crate::ConfigStore) (change notifications), and the
//!   [`Supervisor`](crate::Supervisor) (`kernel.*` lifecycle topics).
//! - **Subscribers**: modules register handlers during `initialize()`; the
//!   owner name ties every registration to its module so one unsubscribe
//!   call can drop them all during cleanup.

mod bus;
mod event;
mod handler;

pub use bus::{EventBus, RequestOutcome};
pub use event::Event;
pub use handler::{Handler, HandlerResult};
