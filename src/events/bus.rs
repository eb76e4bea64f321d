//! # EventBus: wildcard-routed fan-out dispatch and request/response.
//!
//! The bus is the only communication channel between modules. It routes an
//! [`Event`] to every matching subscription, isolates subscriber failures,
//! and correlates request/response exchanges over the same broadcast path.
//!
//! ## Architecture
//! ```text
//! publish(event)
//!     │  resolve: exact[topic] + every wildcard pattern matching topic
//!     ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ one task per handler, gated by a counting semaphore     │
//! │ (dispatch_limit in flight, default 10)                  │
//! │   inline handler   → awaited on the scheduler           │
//! │   blocking handler → spawn_blocking worker pool         │
//! │   error/panic      → logged, excluded from results      │
//! └───────────────┬─────────────────────────────────────────┘
//!                 ▼
//!       needs_response? each non-nil result also resolves the
//!       PendingRequest slot for the event's correlation id
//!       (first resolver wins, the rest are no-ops)
//!
//! request(topic, payload, timeout)
//!     ├─ no matching subscription → NoResponder, nothing published
//!     ├─ allocate correlation id, park a oneshot slot
//!     ├─ publish as a tracked background dispatch
//!     └─ await slot up to timeout
//!          ├─ first non-nil handler result → Reply(value)
//!          ├─ dispatch drained with no result → NoResponder (early)
//!          ├─ deadline hit → NoResponder (slot removed, never leaked)
//!          └─ shutdown() → Shutdown sentinel
//! ```
//!
//! ## Rules
//! - **No ordering guarantees** between subscribers of one publish, nor
//!   between two publishes. This is a broadcast system, not a log.
//! - **Failure isolation**: one failing subscriber never prevents the
//!   others from running and never fails the publish call.
//! - **No leaks**: every PendingRequest is removed on reply, timeout, or
//!   shutdown. [`EventBus::shutdown`] force-resolves all of them with
//!   [`RequestOutcome::Shutdown`] so no caller can block past shutdown.
//! - **Short critical sections**: subscription tables and the pending map
//!   are locked only to mutate in memory, never across a suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{oneshot, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::events::{Event, Handler};
use crate::topics::{is_wildcard, PatternCache};

/// Global correlation-id counter for request/response pairing.
static CORRELATION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Result of a [`EventBus::request`] call.
///
/// `NoResponder` covers both "zero matching subscribers" and "deadline hit
/// with no answer". Callers must treat it as the absence of a responder,
/// never as a valid empty answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The first non-nil handler result.
    Reply(Value),
    /// Nobody answered: no matching subscription, every handler declined,
    /// or the deadline passed.
    NoResponder,
    /// The bus was shut down while the request was pending.
    Shutdown,
}

impl RequestOutcome {
    /// True for [`RequestOutcome::Reply`].
    pub fn is_reply(&self) -> bool {
        matches!(self, RequestOutcome::Reply(_))
    }

    /// True for the shutdown sentinel.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, RequestOutcome::Shutdown)
    }

    /// Extracts the reply value, if any.
    pub fn into_reply(self) -> Option<Value> {
        match self {
            RequestOutcome::Reply(value) => Some(value),
            _ => None,
        }
    }
}

/// One registration: (owner, pattern, handler).
///
/// Identity for unsubscription is (pattern, owner); duplicates are allowed
/// and both fire.
#[derive(Clone)]
struct Subscription {
    owner: Arc<str>,
    handler: Handler,
}

/// An in-flight request awaiting its first non-nil result.
struct PendingRequest {
    #[allow(dead_code)]
    deadline: Instant,
    slot: Option<oneshot::Sender<RequestOutcome>>,
}

struct BusInner {
    exact: RwLock<HashMap<String, Vec<Subscription>>>,
    wildcard: RwLock<HashMap<String, Vec<Subscription>>>,
    cache: PatternCache,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    dispatch_limit: usize,
    cancel: CancellationToken,
    tracker: TaskTracker,
    down: AtomicBool,
}

/// Pub/sub dispatcher shared by every module. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus.
    ///
    /// - `dispatch_limit`: max concurrently running handlers per publish
    ///   (clamped to a minimum of 1).
    /// - `cache_capacity`: bound of the compiled-pattern LRU cache.
    pub fn new(dispatch_limit: usize, cache_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                exact: RwLock::new(HashMap::new()),
                wildcard: RwLock::new(HashMap::new()),
                cache: PatternCache::new(cache_capacity),
                pending: Mutex::new(HashMap::new()),
                dispatch_limit: dispatch_limit.max(1),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                down: AtomicBool::new(false),
            }),
        }
    }

    /// Registers `handler` for `pattern` on behalf of `owner`.
    ///
    /// Duplicate (owner, pattern) registrations are kept and both fire;
    /// callers needing idempotence must unsubscribe first. Wildcard
    /// patterns are compiled into the cache up front.
    pub fn subscribe(&self, owner: &str, pattern: &str, handler: Handler) {
        if self.inner.down.load(AtomicOrdering::SeqCst) {
            warn!("subscribe('{owner}', '{pattern}') ignored: bus is shut down");
            return;
        }
        let sub = Subscription {
            owner: Arc::from(owner),
            handler,
        };
        if is_wildcard(pattern) {
            self.inner.cache.get(pattern);
            self.inner
                .wildcard
                .write()
                .entry(pattern.to_string())
                .or_default()
                .push(sub);
        } else {
            self.inner
                .exact
                .write()
                .entry(pattern.to_string())
                .or_default()
                .push(sub);
        }
        debug!("module '{owner}' subscribed to '{pattern}'");
    }

    /// Removes registrations for `owner`: one pattern's worth when
    /// `pattern` is given, or every registration otherwise.
    ///
    /// Returns the number removed; safe to call for an owner with zero
    /// subscriptions (returns 0).
    pub fn unsubscribe(&self, owner: &str, pattern: Option<&str>) -> usize {
        let mut removed = 0;
        for table in [&self.inner.exact, &self.inner.wildcard] {
            let mut table = table.write();
            match pattern {
                Some(p) => {
                    if let Some(bucket) = table.get_mut(p) {
                        let before = bucket.len();
                        bucket.retain(|s| s.owner.as_ref() != owner);
                        removed += before - bucket.len();
                        if bucket.is_empty() {
                            table.remove(p);
                        }
                    }
                }
                None => {
                    table.retain(|_, bucket| {
                        let before = bucket.len();
                        bucket.retain(|s| s.owner.as_ref() != owner);
                        removed += before - bucket.len();
                        !bucket.is_empty()
                    });
                }
            }
        }
        debug!("removed {removed} subscription(s) for module '{owner}'");
        removed
    }

    /// Publishes `event` to every matching subscription and awaits all of
    /// them.
    ///
    /// Results are collected only for needs-response events; a plain
    /// publish always returns an empty list. A handler error or panic is
    /// logged and excluded; it never fails the publish or starves other
    /// subscribers.
    pub async fn publish(&self, event: Event) -> Vec<Value> {
        Arc::clone(&self.inner).dispatch(event).await
    }

    /// Publishes a needs-response event and waits up to `timeout` for the
    /// first non-nil handler result.
    ///
    /// With zero matching subscribers this returns
    /// [`RequestOutcome::NoResponder`] immediately without publishing.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        source: &str,
        timeout: Duration,
    ) -> RequestOutcome {
        if self.inner.down.load(AtomicOrdering::SeqCst) {
            return RequestOutcome::Shutdown;
        }
        if self.inner.matching(topic).is_empty() {
            debug!("request '{topic}' from '{source}': no subscribers");
            return RequestOutcome::NoResponder;
        }

        let id = CORRELATION_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(
            id,
            PendingRequest {
                deadline: Instant::now() + timeout,
                slot: Some(tx),
            },
        );

        let event = Event::new(topic, payload, source).with_correlation(id);
        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            let _ = inner.dispatch(event).await;
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Slot dropped without an answer; treated like a missing
            // responder.
            Ok(Err(_)) => RequestOutcome::NoResponder,
            Err(_elapsed) => {
                self.inner.pending.lock().remove(&id);
                warn!("request '{topic}' from '{source}' timed out after {timeout:?}");
                RequestOutcome::NoResponder
            }
        }
    }

    /// Shuts the bus down. Idempotent.
    ///
    /// Cancels in-flight dispatch, resolves every outstanding request with
    /// [`RequestOutcome::Shutdown`], clears the subscription tables, and
    /// waits for tracked dispatch tasks to drain.
    pub async fn shutdown(&self) {
        if self.inner.down.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        info!("event bus shutting down");
        self.inner.cancel.cancel();

        let drained: Vec<PendingRequest> = {
            let mut pending = self.inner.pending.lock();
            pending.drain().map(|(_, p)| p).collect()
        };
        for mut request in drained {
            if let Some(tx) = request.slot.take() {
                let _ = tx.send(RequestOutcome::Shutdown);
            }
        }

        self.inner.exact.write().clear();
        self.inner.wildcard.write().clear();

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of live subscriptions across all patterns.
    pub fn subscription_count(&self) -> usize {
        let exact: usize = self.inner.exact.read().values().map(Vec::len).sum();
        let wildcard: usize = self.inner.wildcard.read().values().map(Vec::len).sum();
        exact + wildcard
    }
}

impl Default for EventBus {
    /// A bus with the default dispatch limit (10) and cache bound (1024).
    fn default() -> Self {
        Self::new(10, 1024)
    }
}

impl BusInner {
    /// Collects the exact-match bucket plus every wildcard bucket whose
    /// compiled matcher accepts `topic`. Locks are dropped before dispatch.
    fn matching(&self, topic: &str) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> =
            self.exact.read().get(topic).cloned().unwrap_or_default();
        let wildcard = self.wildcard.read();
        for (pattern, bucket) in wildcard.iter() {
            if self.cache.get(pattern).matches(topic) {
                subs.extend(bucket.iter().cloned());
            }
        }
        subs
    }

    /// Runs one publish: spawn a gated task per handler, await all of
    /// them, resolve the correlation slot along the way.
    async fn dispatch(self: Arc<Self>, event: Event) -> Vec<Value> {
        let subs = self.matching(&event.topic);
        if subs.is_empty() {
            if let Some(id) = event.correlation_id {
                self.resolve_missing(id);
            }
            return Vec::new();
        }

        let event = Arc::new(event);
        let semaphore = Arc::new(Semaphore::new(self.dispatch_limit));
        let mut handles = Vec::with_capacity(subs.len());

        for sub in subs {
            let inner = Arc::clone(&self);
            let ev = Arc::clone(&event);
            let sem = Arc::clone(&semaphore);
            handles.push(self.tracker.spawn(async move {
                let _permit = tokio::select! {
                    _ = inner.cancel.cancelled() => return None,
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_closed) => return None,
                    },
                };

                let outcome = tokio::select! {
                    _ = inner.cancel.cancelled() => None,
                    res = std::panic::AssertUnwindSafe(sub.handler.invoke(Arc::clone(&ev)))
                        .catch_unwind() =>
                    {
                        match res {
                            Ok(Ok(value)) => value,
                            Ok(Err(err)) => {
                                warn!(
                                    "subscriber '{}' failed handling '{}': {}",
                                    sub.owner, ev.topic, err
                                );
                                None
                            }
                            Err(_panic) => {
                                error!(
                                    "subscriber '{}' panicked handling '{}'",
                                    sub.owner, ev.topic
                                );
                                None
                            }
                        }
                    }
                };

                // First non-nil result wins the correlation slot; the rest
                // find it already gone.
                if let (Some(value), Some(id)) = (&outcome, ev.correlation_id) {
                    inner.resolve(id, value.clone());
                }
                outcome
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(value)) => {
                    if event.needs_response {
                        results.push(value);
                    }
                }
                Ok(None) => {}
                Err(join) => {
                    if !join.is_cancelled() {
                        error!("dispatch task for '{}' aborted: {join}", event.topic);
                    }
                }
            }
        }

        // Every handler has finished; if nobody resolved the slot, unblock
        // the requester now instead of letting it ride out the timeout.
        if let Some(id) = event.correlation_id {
            self.resolve_missing(id);
        }
        results
    }

    /// Resolves the pending slot for `id` with a reply, removing it.
    fn resolve(&self, id: u64, value: Value) {
        let sender = {
            let mut pending = self.pending.lock();
            pending.remove(&id).and_then(|mut p| p.slot.take())
        };
        if let Some(tx) = sender {
            let _ = tx.send(RequestOutcome::Reply(value));
        }
    }

    /// Resolves the pending slot for `id` with `NoResponder`, if it is
    /// still outstanding.
    fn resolve_missing(&self, id: u64) {
        let sender = {
            let mut pending = self.pending.lock();
            pending.remove(&id).and_then(|mut p| p.slot.take())
        };
        if let Some(tx) = sender {
            let _ = tx.send(RequestOutcome::NoResponder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Handler::inline(move |_ev| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(None)
            }
        })
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_both_fire() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("a", "t.x", counting_handler(Arc::clone(&hits)));
        bus.subscribe("a", "t.x", counting_handler(Arc::clone(&hits)));

        bus.publish(Event::new("t.x", json!(null), "test")).await;
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_semantics() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("a", "t.one", counting_handler(Arc::clone(&hits)));
        bus.subscribe("a", "t.two", counting_handler(Arc::clone(&hits)));
        bus.subscribe("a", "t.*", counting_handler(Arc::clone(&hits)));
        bus.subscribe("b", "t.one", counting_handler(Arc::clone(&hits)));

        assert_eq!(bus.unsubscribe("a", Some("t.one")), 1);
        assert_eq!(bus.unsubscribe("missing", None), 0);
        assert_eq!(bus.unsubscribe("a", None), 2);
        assert_eq!(bus.subscription_count(), 1);

        bus.publish(Event::new("t.one", json!(null), "test")).await;
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1, "only b remains");
    }

    #[tokio::test]
    async fn test_replay_matches_in_memory_model() {
        // Replays a mixed subscribe/unsubscribe script and checks the
        // surviving set by observing publish fan-out counts.
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let script: &[(&str, &str)] = &[
            ("asr", "audio.in"),
            ("tts", "audio.*"),
            ("tts", "audio.in"),
            ("llm", "chat.?"),
            ("llm", "audio.in"),
        ];
        let mut model: Vec<(&str, &str)> = Vec::new();
        for &(owner, pattern) in script {
            bus.subscribe(owner, pattern, counting_handler(Arc::clone(&hits)));
            model.push((owner, pattern));
        }

        let removed = bus.unsubscribe("tts", None);
        model.retain(|(owner, _)| *owner != "tts");
        assert_eq!(removed, 2);
        let removed = bus.unsubscribe("llm", Some("chat.?"));
        model.retain(|(owner, pattern)| !(*owner == "llm" && *pattern == "chat.?"));
        assert_eq!(removed, 1);

        assert_eq!(bus.subscription_count(), model.len());

        for topic in ["audio.in", "chat.a", "audio.out"] {
            hits.store(0, AtomicOrdering::SeqCst);
            bus.publish(Event::new(topic, json!(null), "test")).await;
            let expected = model
                .iter()
                .filter(|(_, pattern)| crate::TopicPattern::compile(pattern).matches(topic))
                .count();
            assert_eq!(
                hits.load(AtomicOrdering::SeqCst),
                expected,
                "topic {topic}"
            );
        }
    }

    #[tokio::test]
    async fn test_failing_subscriber_is_isolated() {
        let bus = EventBus::default();
        bus.subscribe(
            "ok1",
            "job.run",
            Handler::inline(|_| async { Ok(Some(json!(1))) }),
        );
        bus.subscribe(
            "bad",
            "job.run",
            Handler::inline(|_| async { Err(crate::CallbackError::new("boom")) }),
        );
        bus.subscribe(
            "panicky",
            "job.run",
            Handler::inline(|_| async { panic!("kaboom") }),
        );
        bus.subscribe(
            "ok2",
            "job.run",
            Handler::inline(|_| async { Ok(Some(json!(2))) }),
        );

        let event = Event::new("job.run", json!(null), "test").with_correlation(u64::MAX);
        let mut results = bus.publish(event).await;
        results.sort_by_key(|v| v.as_i64());
        assert_eq!(results, vec![json!(1), json!(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_without_subscribers_returns_immediately() {
        let bus = EventBus::default();
        let started = Instant::now();
        let outcome = bus
            .request("nobody.home", json!(null), "test", Duration::from_secs(5))
            .await;
        assert_eq!(outcome, RequestOutcome::NoResponder);
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_request_returns_first_reply() {
        let bus = EventBus::default();
        bus.subscribe(
            "responder",
            "b.greet",
            Handler::inline(|ev| async move {
                let who = ev.payload["who"].as_str().unwrap_or("?").to_string();
                Ok(Some(json!({ "reply": format!("hello {who}") })))
            }),
        );

        let outcome = bus
            .request(
                "b.greet",
                json!({"who": "A"}),
                "a",
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(outcome, RequestOutcome::Reply(json!({"reply": "hello A"})));
        assert_eq!(bus.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_removes_pending() {
        let bus = EventBus::default();
        bus.subscribe(
            "slow",
            "b.greet",
            Handler::inline(|_| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(Some(json!("too late")))
            }),
        );

        let outcome = bus
            .request("b.greet", json!(null), "a", Duration::from_secs(1))
            .await;
        assert_eq!(outcome, RequestOutcome::NoResponder);
        assert_eq!(bus.pending_requests(), 0, "pending entry leaked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_resolves_early_when_all_decline() {
        let bus = EventBus::default();
        bus.subscribe("quiet", "q.t", Handler::inline(|_| async { Ok(None) }));

        let started = Instant::now();
        let outcome = bus
            .request("q.t", json!(null), "test", Duration::from_secs(30))
            .await;
        assert_eq!(outcome, RequestOutcome::NoResponder);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_resolves_pending_requests() {
        let bus = EventBus::default();
        bus.subscribe(
            "sleepy",
            "s.t",
            Handler::inline(|_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Some(json!("never")))
            }),
        );

        let requester = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = bus
                    .request("s.t", json!(null), "test", Duration::from_secs(5))
                    .await;
                (outcome, started.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.shutdown().await;
        // Idempotent.
        bus.shutdown().await;

        let (outcome, elapsed) = requester.await.unwrap();
        assert_eq!(outcome, RequestOutcome::Shutdown);
        assert!(
            elapsed < Duration::from_secs(1),
            "caller waited {elapsed:?} instead of being released"
        );
        assert_eq!(bus.pending_requests(), 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_and_forget_discards_results() {
        let bus = EventBus::default();
        bus.subscribe(
            "r",
            "f.t",
            Handler::inline(|_| async { Ok(Some(json!("ignored"))) }),
        );
        let results = bus.publish(Event::new("f.t", json!(null), "test")).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_request_after_shutdown_returns_sentinel() {
        let bus = EventBus::default();
        bus.shutdown().await;
        let outcome = bus
            .request("any.topic", json!(null), "test", Duration::from_secs(1))
            .await;
        assert_eq!(outcome, RequestOutcome::Shutdown);
    }
}
