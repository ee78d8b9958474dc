//! Backend Module
//!
//! The adapter contract every storage medium implements, the concrete
//! variants shipped with the crate, and the factory selecting between them.
//!
//! Backends only move entries in and out of storage. All TTL and version
//! policy lives in [`crate::cache::Store`].

mod memory;
mod shared;

use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{Entry, Store};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

pub use memory::MemoryBackend;
pub use shared::{validate_namespace, SharedMedium, SharedMediumBackend, NAMESPACE_SEPARATOR};

// == Backend Trait ==
/// Minimal capability surface the store is written against.
///
/// Enumeration streams are lazy, finite and restart from scratch on each
/// call. They are scoped to this backend's namespace and unfiltered.
/// A payload that cannot be decoded is reported as [`StoreError::Corrupt`]
/// (from `load_entry` or as a stream item) rather than skipped.
#[async_trait]
pub trait Backend<T>: Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    async fn load_entry(&self, key: &str) -> Result<Option<Entry<T>>>;

    async fn save_entry(&self, key: &str, entry: &Entry<T>) -> Result<()>;

    async fn remove_entry(&self, key: &str) -> Result<()>;

    /// Saves several entries. The default issues one `save_entry` per key
    /// and is not atomic across keys.
    async fn save_entries(&self, entries: &[(String, Entry<T>)]) -> Result<()> {
        for (key, entry) in entries {
            self.save_entry(key, entry).await?;
        }
        Ok(())
    }

    /// Removes several entries. The default issues one `remove_entry` per key.
    async fn remove_entries(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove_entry(key).await?;
        }
        Ok(())
    }

    fn raw_keys(&self) -> BoxStream<'_, Result<String>>;

    fn raw_entries(&self) -> BoxStream<'_, Result<(String, Entry<T>)>>;

    /// Removes every entry in this backend's namespace.
    async fn clear(&self) -> Result<()> {
        let keys: Vec<String> = self.raw_keys().try_collect().await?;
        self.remove_entries(&keys).await
    }
}

// == Backend Kind ==
/// The closed set of backend variants the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Shared,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "shared" => Ok(BackendKind::Shared),
            other => Err(StoreError::UnsupportedBackend(other.to_string())),
        }
    }
}

// == Any Backend ==
/// One of the shipped backends, chosen at runtime.
#[derive(Debug)]
pub enum AnyBackend<T> {
    Memory(MemoryBackend<T>),
    Shared(SharedMediumBackend<T>),
}

#[async_trait]
impl<T> Backend<T> for AnyBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load_entry(&self, key: &str) -> Result<Option<Entry<T>>> {
        match self {
            AnyBackend::Memory(b) => b.load_entry(key).await,
            AnyBackend::Shared(b) => b.load_entry(key).await,
        }
    }

    async fn save_entry(&self, key: &str, entry: &Entry<T>) -> Result<()> {
        match self {
            AnyBackend::Memory(b) => b.save_entry(key, entry).await,
            AnyBackend::Shared(b) => b.save_entry(key, entry).await,
        }
    }

    async fn remove_entry(&self, key: &str) -> Result<()> {
        match self {
            AnyBackend::Memory(b) => b.remove_entry(key).await,
            AnyBackend::Shared(b) => b.remove_entry(key).await,
        }
    }

    async fn save_entries(&self, entries: &[(String, Entry<T>)]) -> Result<()> {
        match self {
            AnyBackend::Memory(b) => b.save_entries(entries).await,
            AnyBackend::Shared(b) => b.save_entries(entries).await,
        }
    }

    async fn remove_entries(&self, keys: &[String]) -> Result<()> {
        match self {
            AnyBackend::Memory(b) => b.remove_entries(keys).await,
            AnyBackend::Shared(b) => b.remove_entries(keys).await,
        }
    }

    fn raw_keys(&self) -> BoxStream<'_, Result<String>> {
        match self {
            AnyBackend::Memory(b) => b.raw_keys(),
            AnyBackend::Shared(b) => b.raw_keys(),
        }
    }

    fn raw_entries(&self) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        match self {
            AnyBackend::Memory(b) => b.raw_entries(),
            AnyBackend::Shared(b) => b.raw_entries(),
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            AnyBackend::Memory(b) => b.clear().await,
            AnyBackend::Shared(b) => b.clear().await,
        }
    }
}

// == Factory ==
/// Builds a store over the backend named in `config`.
///
/// `medium` is the physical medium shared backends attach to; when `None`
/// a private one is created. Memory backends ignore it.
pub fn open_store<T>(
    config: &StoreConfig,
    medium: Option<SharedMedium>,
) -> Result<Store<T, AnyBackend<T>>>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    config.validate()?;

    let backend = match config.backend {
        BackendKind::Memory => AnyBackend::Memory(MemoryBackend::new()),
        BackendKind::Shared => AnyBackend::Shared(SharedMediumBackend::new(
            medium.unwrap_or_default(),
            &config.namespace,
        )?),
    };

    tracing::debug!(
        namespace = %config.namespace,
        backend = ?config.backend,
        "Opening store"
    );

    let store = Store::new(backend, config.ttl, config.version.clone());
    Ok(match config.cache_limit {
        Some(limit) => store.use_cache(limit),
        None => store,
    })
}
