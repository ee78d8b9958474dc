//! Cache Module
//!
//! Entry model, LRU accelerator and the policy engine that ties them to a
//! backend.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{Clock, Entry, ManualClock, SystemClock, Ttl, Version};
pub use lru::{LruCache, DEFAULT_CACHE_LIMIT};
pub use stats::CacheStats;
pub use store::{IterOptions, Store};
