//! LRU Accelerator Module
//!
//! Bounded in-memory map with strict recency-ordered eviction, used in front
//! of a backend to skip redundant loads.

use std::collections::{HashMap, VecDeque};

use crate::cache::CacheStats;

/// Capacity used when none is given.
pub const DEFAULT_CACHE_LIMIT: usize = 100;

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub(crate) struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}

// == LRU Cache ==
/// Bounded key-value map evicting the least recently touched key.
///
/// Both `get` hits and `set` count as a touch. Size never exceeds `limit`
/// after a `set`.
#[derive(Debug)]
pub struct LruCache<V> {
    entries: HashMap<String, V>,
    order: LruTracker,
    stats: CacheStats,
    limit: usize,
}

impl<V: Clone> LruCache<V> {
    // == Constructor ==
    /// Creates an empty cache holding at most `limit` keys (minimum one).
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: LruTracker::new(),
            stats: CacheStats::new(),
            limit: limit.max(1),
        }
    }

    // == Get ==
    /// Returns a clone of the cached value and marks the key most recently used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                let value = value.clone();
                self.order.touch(key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Inserts or refreshes a key as most recently used.
    ///
    /// A new key arriving at capacity evicts the single oldest key first.
    pub fn set(&mut self, key: &str, value: V) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.limit {
            if let Some(evicted) = self.order.evict_oldest() {
                self.entries.remove(&evicted);
                self.stats.record_eviction();
            }
        }

        self.entries.insert(key.to_string(), value);
        self.order.touch(key);
        self.stats.set_total_entries(self.entries.len());
    }

    pub fn delete(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.stats.set_total_entries(0);
    }

    // == Resize ==
    /// Changes the capacity, evicting oldest keys until the new bound holds.
    pub fn resize(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.entries.len() > self.limit {
            match self.order.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
        self.stats.set_total_entries(self.entries.len());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }
}

impl<V: Clone> Default for LruCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIMIT)
    }
}
