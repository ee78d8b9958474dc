//! Layered Cache - a backend-agnostic key-value cache
//!
//! Layers TTL expiry, version invalidation, an optional LRU accelerator and
//! batch writes over any storage implementing [`backend::Backend`].

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use backend::{open_store, AnyBackend, Backend, BackendKind, MemoryBackend, SharedMedium};
pub use cache::{Entry, IterOptions, Store, Ttl, Version};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use tasks::spawn_purge_task;
