//! Subscriber handlers and their two calling conventions.
//!
//! A handler is chosen to be one of two kinds **at subscribe time**:
//!
//! - [`Handler::inline`] — an async closure awaited on the scheduler. The
//!   default for cooperative, non-blocking work.
//! - [`Handler::blocking`] — a sync closure off-loaded to the blocking
//!   worker pool via `spawn_blocking`, so slow or CPU-heavy callbacks
//!   cannot stall the scheduler.
//!
//! Both return [`HandlerResult`]: `Ok(Some(value))` answers a correlated
//! request, `Ok(None)` declines to answer, `Err` is logged by dispatch and
//! excluded from the result set.
//!
//! ## Example
//! ```rust
//! use swarmvisor::Handler;
//!
//! let echo = Handler::inline(|ev| async move { Ok(Some(ev.payload.clone())) });
//! let slow = Handler::blocking(|_ev| {
//!     // checksum a file, run a codec, ...
//!     Ok(None)
//! });
//! assert!(!echo.is_blocking());
//! assert!(slow.is_blocking());
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::CallbackError;
use crate::events::Event;

/// Result of one handler invocation. `None` means "no answer".
pub type HandlerResult = Result<Option<Value>, CallbackError>;

type InlineFn = dyn Fn(Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type BlockingFn = dyn Fn(Arc<Event>) -> HandlerResult + Send + Sync;

#[derive(Clone)]
enum HandlerKind {
    Inline(Arc<InlineFn>),
    Blocking(Arc<BlockingFn>),
}

/// A subscriber callback plus its calling convention.
#[derive(Clone)]
pub struct Handler {
    kind: HandlerKind,
}

impl Handler {
    /// Wraps an async closure that runs inline on the scheduler.
    pub fn inline<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            kind: HandlerKind::Inline(Arc::new(move |ev| Box::pin(f(ev)))),
        }
    }

    /// Wraps a sync closure that is dispatched on the blocking worker pool.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(Arc<Event>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            kind: HandlerKind::Blocking(Arc::new(f)),
        }
    }

    /// True for the off-loaded convention.
    pub fn is_blocking(&self) -> bool {
        matches!(self.kind, HandlerKind::Blocking(_))
    }

    /// Invokes the handler for one event.
    ///
    /// A panic inside a blocking handler surfaces as a `CallbackError`
    /// (the join error of its worker task); panics in inline handlers are
    /// caught by dispatch itself.
    pub(crate) async fn invoke(&self, event: Arc<Event>) -> HandlerResult {
        match &self.kind {
            HandlerKind::Inline(f) => f(event).await,
            HandlerKind::Blocking(f) => {
                let f = Arc::clone(f);
                match tokio::task::spawn_blocking(move || f(event)).await {
                    Ok(result) => result,
                    Err(join) => Err(CallbackError::new(format!(
                        "blocking handler aborted: {join}"
                    ))),
                }
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_blocking() { "blocking" } else { "inline" };
        f.debug_struct("Handler").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_inline_handler_returns_value() {
        let h = Handler::inline(|ev| async move { Ok(Some(ev.payload.clone())) });
        let ev = Arc::new(Event::new("t", json!(42), "test"));
        assert_eq!(h.invoke(ev).await.unwrap(), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_blocking_handler_runs_off_scheduler() {
        let h = Handler::blocking(|_ev| Ok(Some(json!("done"))));
        let ev = Arc::new(Event::new("t", json!(null), "test"));
        assert_eq!(h.invoke(ev).await.unwrap(), Some(json!("done")));
    }

    #[tokio::test]
    async fn test_blocking_panic_becomes_error() {
        let h = Handler::blocking(|_ev| panic!("boom"));
        let ev = Arc::new(Event::new("t", json!(null), "test"));
        assert!(h.invoke(ev).await.is_err());
    }
}
