//! # ConfigStore: durable module → key → value configuration.
//!
//! The store persists a two-level JSON document (`module → key → value`)
//! and notifies interested modules of changes through the event bus, on
//! the topic `"<module>.<key>"`. The backing file is human-editable and is
//! rewritten in full on every write.
//!
//! ## Rules
//! - A missing backing file is created empty; an empty or malformed file
//!   falls back to an empty in-memory map with a warning. A bad config
//!   file never aborts startup.
//! - A change notification fires **only when an existing value changes**
//!   (value equality). The first write of a key, including the default
//!   written by [`ConfigStore::register`], persists silently, so
//!   registration-time defaulting cannot ping the registering module.
//! - All mutation goes through one lock; the lock is released before any
//!   file I/O or bus publish.
//!
//! ## Example
//! ```no_run
//! use serde_json::json;
//! use swarmvisor::{ConfigStore, EventBus};
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let store = ConfigStore::load("config.json", bus);
//!
//! let volume = store
//!     .register("tts", "volume", json!(0.8), |v| {
//!         println!("volume changed to {v}");
//!     })
//!     .await;
//! assert_eq!(volume, json!(0.8));
//!
//! // A later change from anywhere (HTTP panel, another module) fires the
//! // callback exactly once.
//! store.set("tts", "volume", json!(0.5)).await;
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::events::{Event, EventBus, Handler};

/// Source name the store stamps on change-notification events.
const SOURCE: &str = "config";

/// Formats the change-notification topic for a config entry.
pub fn config_topic(module: &str, key: &str) -> String {
    format!("{module}.{key}")
}

struct StoreInner {
    path: PathBuf,
    bus: EventBus,
    data: RwLock<Map<String, Value>>,
    closed: AtomicBool,
}

/// Durable module-scoped key/value store. Cheap to clone.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl ConfigStore {
    /// Opens the store, reading `path` if it exists.
    ///
    /// Never fails: a missing file is created empty, a corrupt one is
    /// logged and replaced by an empty in-memory map (the file on disk is
    /// left untouched until the next write).
    pub fn load(path: impl Into<PathBuf>, bus: EventBus) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => {
                    info!("configuration loaded from {}", path.display());
                    map
                }
                Ok(_) => {
                    warn!(
                        "config file {} is not a JSON object, starting empty",
                        path.display()
                    );
                    Map::new()
                }
                Err(err) => {
                    warn!(
                        "config file {} is malformed ({err}), starting empty",
                        path.display()
                    );
                    Map::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("creating new config file at {}", path.display());
                let map = Map::new();
                persist(&path, &map);
                map
            }
            Err(err) => {
                warn!(
                    "config file {} is unreadable ({err}), starting empty",
                    path.display()
                );
                Map::new()
            }
        };

        Self {
            inner: Arc::new(StoreInner {
                path,
                bus,
                data: RwLock::new(data),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the stored value for `(module, key)`, if any.
    pub fn get(&self, module: &str, key: &str) -> Option<Value> {
        self.inner
            .data
            .read()
            .get(module)
            .and_then(Value::as_object)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Returns the stored value or `default` when absent. Never fails.
    pub fn get_or(&self, module: &str, key: &str, default: Value) -> Value {
        self.get(module, key).unwrap_or(default)
    }

    /// True when `(module, key)` has a stored value.
    pub fn contains(&self, module: &str, key: &str) -> bool {
        self.get(module, key).is_some()
    }

    /// Snapshot of one module's entries (empty map when unknown).
    pub fn module_config(&self, module: &str) -> Map<String, Value> {
        self.inner
            .data
            .read()
            .get(module)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Writes `(module, key) = value` and persists the whole document.
    ///
    /// Publishes a change event on `"<module>.<key>"` only when a previous
    /// value existed and differs from `value` (compared by value, not
    /// identity). Two consecutive identical writes notify once in total.
    pub async fn set(&self, module: &str, key: &str, value: Value) {
        if self.inner.closed.load(AtomicOrdering::SeqCst) {
            warn!("set('{module}', '{key}') after close; value not persisted");
            return;
        }

        // Mutate in memory under the lock, snapshot for persistence, then
        // release before touching the file or the bus.
        let (snapshot, previous) = {
            let mut data = self.inner.data.write();
            let entries = data
                .entry(module.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entries.is_object() {
                warn!("config section '{module}' was not an object, resetting it");
                *entries = Value::Object(Map::new());
            }
            let previous = match entries.as_object_mut() {
                Some(map) => map.insert(key.to_string(), value.clone()),
                None => None,
            };
            (data.clone(), previous)
        };

        persist(&self.inner.path, &snapshot);

        match previous {
            Some(old) if old != value => {
                let topic = config_topic(module, key);
                debug!("config changed: {topic} = {value}");
                self.inner
                    .bus
                    .publish(Event::new(topic, value, SOURCE))
                    .await;
            }
            _ => {}
        }
    }

    /// Subscribes `callback` to changes of `(module, key)` and defaults
    /// the key if it has no stored value yet.
    ///
    /// The registration-time default is persisted without firing any
    /// notification; only a later change of an existing value does.
    /// Returns the effective stored value.
    pub async fn register<F>(&self, module: &str, key: &str, default: Value, callback: F) -> Value
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let topic = config_topic(module, key);
        self.inner.bus.subscribe(
            module,
            &topic,
            Handler::inline(move |ev| {
                let value = ev.payload.clone();
                callback(value);
                async { Ok(None) }
            }),
        );

        if !self.contains(module, key) {
            self.set(module, key, default.clone()).await;
        }
        self.get_or(module, key, default)
    }

    /// Final flush; the store stops accepting writes afterwards. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let snapshot = self.inner.data.read().clone();
        persist(&self.inner.path, &snapshot);
        info!("config store closed ({})", self.inner.path.display());
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

/// Rewrites the backing file in full. Failures are logged, never raised:
/// the in-memory state stays authoritative for the rest of the run.
fn persist(path: &Path, data: &Map<String, Value>) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                error!("cannot create config directory {}: {err}", parent.display());
                return;
            }
        }
    }
    match serde_json::to_string_pretty(data) {
        Ok(text) => {
            if let Err(err) = std::fs::write(path, text) {
                error!("cannot persist config to {}: {err}", path.display());
            }
        }
        Err(err) => error!("cannot serialize config: {err}"),
    }
}
