//! Render dedup cache.
//!
//! Every refresh pass recomputes full payloads, but most ticks carry data
//! identical to the previous one. Before pushing a payload at a render
//! target we fingerprint it and compare against the last fingerprint pushed
//! to that target; a match skips the write entirely. Keys are scoped per
//! target (and per timeframe for candle series) so switching timeframes is
//! never mistaken for "unchanged".
//!
//! Correctness does not depend on this cache: it can be disabled wholesale
//! and every pass simply renders. Fingerprints are compact (length, newest
//! timestamp, content hash) rather than retained payload copies.

use rustc_hash::FxHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Compact digest of a payload destined for one render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    /// Element count of the payload
    pub len: usize,
    /// Newest timestamp in the payload, 0 when not time-series shaped
    pub last_time: i64,
    /// Content hash over the full payload
    pub digest: u64,
}

impl Fingerprint {
    /// Fingerprint any hashable payload.
    pub fn of<T: Hash>(payload: &T, len: usize, last_time: i64) -> Self {
        let mut hasher = FxHasher::default();
        payload.hash(&mut hasher);
        Self {
            len,
            last_time,
            digest: hasher.finish(),
        }
    }

    /// Fingerprint a time-series slice whose items expose a timestamp.
    pub fn of_series<T: Hash>(items: &[T], time_of: impl Fn(&T) -> i64) -> Self {
        let mut hasher = FxHasher::default();
        for item in items {
            item.hash(&mut hasher);
        }
        Self {
            len: items.len(),
            last_time: items.last().map(&time_of).unwrap_or(0),
            digest: hasher.finish(),
        }
    }
}

/// Last-pushed fingerprints keyed by render target.
///
/// `should_skip` is the single decision point: it both answers "unchanged?"
/// and records the new fingerprint when the answer is no, so callers cannot
/// forget the record step.
#[derive(Debug)]
pub struct RenderCache {
    enabled: bool,
    seen: HashMap<String, Fingerprint>,
}

impl RenderCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seen: HashMap::new(),
        }
    }

    /// True when `fingerprint` matches the last one pushed at `key`, meaning
    /// the render can be skipped. Otherwise records it and returns false.
    /// With the cache disabled, always false and nothing is recorded.
    pub fn should_skip(&mut self, key: &str, fingerprint: Fingerprint) -> bool {
        if !self.enabled {
            return false;
        }
        if self.seen.get(key) == Some(&fingerprint) {
            return true;
        }
        self.seen.insert(key.to_string(), fingerprint);
        false
    }

    /// Drop the entry for one target so its next render is unconditional.
    pub fn invalidate(&mut self, key: &str) {
        self.seen.remove(key);
    }

    /// Drop every entry whose key starts with `prefix`. Used when a pair
    /// view is torn down and all of its per-target entries must go.
    pub fn invalidate_prefix(&mut self, prefix: &str) {
        self.seen.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
