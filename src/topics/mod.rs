//! Topic pattern matching: wildcard compilation and the bounded matcher cache.
//!
//! Topics are dot-separated strings. A subscription pattern may contain two
//! wildcards, both scoped to a single segment:
//! - `*` matches a run of zero or more characters excluding `.`
//! - `?` matches exactly one character excluding `.`
//!
//! Exact (wildcard-free) topics never reach this module at dispatch time;
//! the bus routes them through a direct map lookup. Only patterns containing
//! `*`/`?` are compiled, and compiled matchers are cached by pattern string
//! in a bounded LRU so programmatically generated patterns cannot grow the
//! cache without limit.

mod cache;
mod pattern;

pub use cache::PatternCache;
pub use pattern::{is_wildcard, TopicPattern};
