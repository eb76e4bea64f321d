//! Bounded LRU cache of compiled topic patterns.
//!
//! Compilation is cheap but not free, and subscription patterns can be
//! generated programmatically, so the cache is bounded: when full, the
//! least-recently-used entry is evicted. Insertion order doubles as recency
//! order; a hit moves the entry to the back, eviction pops the front.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::pattern::TopicPattern;

/// Thread-safe LRU cache keyed by pattern string.
pub struct PatternCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Arc<TopicPattern>>>,
}

impl PatternCache {
    /// Creates a cache holding at most `capacity` compiled patterns
    /// (clamped to a minimum of 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Returns the compiled matcher for `pattern`, compiling and caching it
    /// on first use. A hit refreshes the entry's recency.
    pub fn get(&self, pattern: &str) -> Arc<TopicPattern> {
        let mut entries = self.entries.lock();
        if let Some(index) = entries.get_index_of(pattern) {
            let last = entries.len() - 1;
            entries.move_index(index, last);
            if let Some((_, compiled)) = entries.get_index(last) {
                return Arc::clone(compiled);
            }
        }

        let compiled = Arc::new(TopicPattern::compile(pattern));
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(pattern.to_string(), Arc::clone(&compiled));
        compiled
    }

    /// Number of cached patterns.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
