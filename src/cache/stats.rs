//! Accelerator Statistics Module
//!
//! Tracks accelerator hits, misses and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Counters kept by the LRU accelerator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered without a backend round trip
    pub hits: u64,
    /// Lookups that fell through to the backend
    pub misses: u64,
    /// Keys dropped to stay within the capacity bound
    pub evictions: u64,
    /// Keys currently held
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
