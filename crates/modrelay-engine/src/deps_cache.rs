//! Run-scoped bookkeeping shared by every level of the publish walk.
//!
//! `known` maps a cache key to "published": `true` once the module is in the
//! registry, either because the probe found it there or because this run
//! published it. A key that is present with `false` has been discovered and
//! queued but not yet published. Presence in the map is the walk's visited
//! set.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DependenciesCache {
    known: HashMap<String, bool>,
    total: usize,
    successes: usize,
    failures: usize,
}

impl DependenciesCache {
    pub fn new() -> Self {
        DependenciesCache::default()
    }

    /// Record `id` with its published state, replacing any previous value.
    pub fn mark(&mut self, id: &str, published: bool) {
        self.known.insert(id.to_string(), published);
    }

    pub fn is_published(&self, id: &str) -> bool {
        self.known.get(id).copied().unwrap_or(false)
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains_key(id)
    }

    pub fn increment_total(&mut self, count: usize) {
        self.total += count;
    }

    pub fn increment_success(&mut self) {
        self.successes += 1;
    }

    pub fn increment_failures(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}
