//! The event record routed by the bus.
//!
//! Events are immutable once published: dispatch hands every subscriber a
//! shared reference to the same record. `seq` is a globally monotonic
//! sequence number; use it to order events from the same observer when logs
//! interleave.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use swarmvisor::Event;
//!
//! let ev = Event::new("chat.message", json!({"who": "viewer-1"}), "chat");
//! assert_eq!(ev.topic, "chat.message");
//! assert!(!ev.needs_response);
//! assert!(ev.correlation_id.is_none());
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde_json::Value;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// An event on the bus.
///
/// - `seq`: globally monotonic sequence number
/// - `at`: wall-clock timestamp (for logs)
/// - `needs_response` + `correlation_id` are set together by the request
///   path; plain publishes leave both unset
#[derive(Debug, Clone)]
pub struct Event {
    /// Dot-separated routing topic.
    pub topic: String,
    /// Opaque structured payload.
    pub payload: Value,
    /// Name of the publishing module (or `"kernel"`/`"config"`).
    pub source: String,
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// True when the publisher is waiting on a correlated reply.
    pub needs_response: bool,
    /// Correlation id, present only when `needs_response` is set.
    pub correlation_id: Option<u64>,
}

impl Event {
    /// Creates a fire-and-forget event with the next sequence number.
    pub fn new(topic: impl Into<String>, payload: Value, source: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            source: source.into(),
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            needs_response: false,
            correlation_id: None,
        }
    }

    /// Marks the event as expecting a correlated reply.
    ///
    /// Only the bus request path creates these.
    pub(crate) fn with_correlation(mut self, id: u64) -> Self {
        self.needs_response = true;
        self.correlation_id = Some(id);
        self
    }
}
