//! Cache Store Module
//!
//! Backend-agnostic policy engine: stamps entries on write, applies TTL and
//! version checks on read, fronts the backend with an optional LRU
//! accelerator, and repairs invalid entries it finds while scanning.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{CacheStats, Clock, Entry, LruCache, SystemClock, Ttl, Version};
use crate::error::{Result, StoreError};

// == Iteration Options ==
/// Options for [`Store::keys`], [`Store::values`] and [`Store::entries`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IterOptions {
    /// Skip invalid entries and remove them once the scan is drained
    pub check_ttl: bool,
}

impl IterOptions {
    pub fn checked() -> Self {
        Self { check_ttl: true }
    }
}

// == Store ==
/// Key-value cache over an arbitrary [`Backend`].
///
/// Reads see identical TTL and version behavior whichever backend is used
/// and whether or not the accelerator is enabled.
pub struct Store<T, B> {
    backend: Arc<B>,
    ttl: Ttl,
    version: Option<Version>,
    accelerator: Mutex<Option<LruCache<Entry<T>>>>,
    clock: Arc<dyn Clock>,
}

impl<T, B> Store<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Backend<T>,
{
    // == Constructor ==
    /// Creates a store with no accelerator, reading time from the system clock.
    pub fn new(backend: B, ttl: Ttl, version: Option<Version>) -> Self {
        Self {
            backend: Arc::new(backend),
            ttl,
            version,
            accelerator: Mutex::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    // == Accelerator ==
    /// Enables the LRU accelerator with room for `limit` keys.
    pub fn use_cache(self, limit: usize) -> Self {
        self.set_cache_limit(limit);
        self
    }

    /// Enables the accelerator, or resizes it if already enabled.
    pub fn set_cache_limit(&self, limit: usize) {
        let mut guard = self.accelerator();
        match guard.as_mut() {
            Some(cache) => cache.resize(limit),
            None => *guard = Some(LruCache::new(limit)),
        }
    }

    pub fn accelerator_stats(&self) -> Option<CacheStats> {
        self.accelerator().as_ref().map(LruCache::stats)
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // == Get ==
    /// Returns the live value for `key` under the store's TTL.
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        self.get_within(key, self.ttl).await
    }

    /// Returns the live value for `key` under a per-call TTL.
    pub async fn get_within(&self, key: &str, ttl: Ttl) -> Result<Option<T>> {
        Ok(self.live_entry(key, ttl).await?.map(|entry| entry.value))
    }

    // == Get Or Set ==
    /// Cache-aside read.
    ///
    /// On a miss `setter` runs once and its result is written with [`Store::set`]
    /// and returned as is, without another TTL check. A `None` result deletes
    /// the key. Concurrent misses on one key are not de-duplicated.
    pub async fn get_or_set_with<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Ttl>,
        setter: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(entry) = self.live_entry(key, ttl.unwrap_or(self.ttl)).await? {
            return Ok(Some(entry.value));
        }

        let value = setter().await;
        self.set(key, value.clone()).await?;
        Ok(value)
    }

    // == Set ==
    /// Writes `value` under `key` and returns the stored entry.
    ///
    /// `None` deletes the key instead and returns `None`.
    pub async fn set(&self, key: &str, value: Option<T>) -> Result<Option<Entry<T>>> {
        let Some(value) = value else {
            self.delete(key).await?;
            return Ok(None);
        };

        let entry = self.stamp(value, self.clock.now_ms());
        self.backend.save_entry(key, &entry).await?;
        self.cache_put(key, &entry);
        Ok(Some(entry))
    }

    // == Set Many ==
    /// Batch write sharing one timestamp.
    ///
    /// `None` values are deleted. All saves go out in one backend call, then
    /// all deletes in another. The result maps every saved key to its entry;
    /// deleted keys are omitted. A key repeated in the input keeps its last value.
    pub async fn set_many<I, K>(&self, values: I) -> Result<HashMap<String, Entry<T>>>
    where
        I: IntoIterator<Item = (K, Option<T>)>,
        K: Into<String>,
    {
        let values: HashMap<String, Option<T>> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();

        let now = self.clock.now_ms();
        let mut to_save = Vec::new();
        let mut to_delete = Vec::new();
        for (key, value) in values {
            match value {
                Some(value) => to_save.push((key, self.stamp(value, now))),
                None => to_delete.push(key),
            }
        }

        if !to_save.is_empty() {
            self.backend.save_entries(&to_save).await?;
        }
        if !to_delete.is_empty() {
            self.backend.remove_entries(&to_delete).await?;
        }

        for (key, entry) in &to_save {
            self.cache_put(key, entry);
        }
        self.cache_delete_all(&to_delete);

        Ok(to_save.into_iter().collect())
    }

    // == Has ==
    pub async fn has(&self, key: &str) -> Result<bool> {
        self.has_within(key, self.ttl).await
    }

    pub async fn has_within(&self, key: &str, ttl: Ttl) -> Result<bool> {
        Ok(self.live_entry(key, ttl).await?.is_some())
    }

    // == Delete ==
    /// Removes `key` from the accelerator and the backend. Absent keys are fine.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.cache_delete(key);
        self.backend.remove_entry(key).await
    }

    // == Updated At ==
    /// Returns the write time of `key`, or 0 when absent or written under
    /// another version. TTL is ignored and nothing is deleted.
    pub async fn updated_at(&self, key: &str) -> Result<u64> {
        Ok(match self.load(key).await? {
            Some(entry) if entry.matches_version(self.version.as_ref()) => entry.time,
            _ => 0,
        })
    }

    // == Raw Access ==
    /// Returns exactly what is stored for `key`, skipping TTL and version checks.
    pub async fn raw_get(&self, key: &str) -> Result<Option<Entry<T>>> {
        self.load(key).await
    }

    /// Streams every stored entry, skipping TTL and version checks.
    pub fn raw_entries(&self) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        self.scan(false)
    }

    // == Iteration ==
    /// Streams keys. Unchecked, this is the backend's raw key listing.
    pub fn keys(&self, options: IterOptions) -> BoxStream<'_, Result<String>> {
        if options.check_ttl {
            self.scan(true).map_ok(|(key, _)| key).boxed()
        } else {
            self.backend.raw_keys()
        }
    }

    pub fn values(&self, options: IterOptions) -> BoxStream<'_, Result<Entry<T>>> {
        self.scan(options.check_ttl)
            .map_ok(|(_, entry)| entry)
            .boxed()
    }

    pub fn entries(&self, options: IterOptions) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        self.scan(options.check_ttl)
    }

    // == Purge ==
    /// Removes every expired, version-stale or corrupt entry and returns how
    /// many were removed. Unlike iteration cleanup, backend failures propagate.
    pub async fn purge_expired_entries(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut stale = Vec::new();

        let mut scan = self.backend.raw_entries();
        while let Some(item) = scan.next().await {
            match item {
                Ok((key, entry)) => {
                    if !entry.is_live(self.ttl, self.version.as_ref(), now) {
                        stale.push(key);
                    }
                }
                Err(StoreError::Corrupt { key, .. }) => stale.push(key),
                Err(e) => return Err(e),
            }
        }
        drop(scan);

        if stale.is_empty() {
            return Ok(0);
        }

        self.backend.remove_entries(&stale).await?;
        self.cache_delete_all(&stale);
        debug!(count = stale.len(), "Purged invalid entries");
        Ok(stale.len())
    }

    // == Clear ==
    /// Empties the accelerator and every entry in this store's namespace.
    pub async fn clear(&self) -> Result<&Self> {
        self.cache_clear();
        self.backend.clear().await?;
        Ok(self)
    }

    // == Internals ==
    fn stamp(&self, value: T, now: u64) -> Entry<T> {
        Entry::new(value, now, self.version.clone())
    }

    fn accelerator(&self) -> MutexGuard<'_, Option<LruCache<Entry<T>>>> {
        self.accelerator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_get(&self, key: &str) -> Option<Entry<T>> {
        self.accelerator().as_mut().and_then(|cache| cache.get(key))
    }

    fn cache_put(&self, key: &str, entry: &Entry<T>) {
        if let Some(cache) = self.accelerator().as_mut() {
            cache.set(key, entry.clone());
        }
    }

    fn cache_delete(&self, key: &str) {
        if let Some(cache) = self.accelerator().as_mut() {
            cache.delete(key);
        }
    }

    fn cache_clear(&self) {
        if let Some(cache) = self.accelerator().as_mut() {
            cache.clear();
        }
    }

    fn cache_delete_all(&self, keys: &[String]) {
        if let Some(cache) = self.accelerator().as_mut() {
            for key in keys {
                cache.delete(key);
            }
        }
    }

    /// Accelerator first, then backend. Corrupt records read as absent and
    /// are removed on a best-effort basis.
    async fn load(&self, key: &str) -> Result<Option<Entry<T>>> {
        let cached = self.cache_get(key);
        if cached.is_some() {
            return Ok(cached);
        }

        match self.backend.load_entry(key).await {
            Ok(Some(entry)) => {
                self.cache_put(key, &entry);
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(StoreError::Corrupt { key: bad, reason }) => {
                debug!(key = %bad, %reason, "Discarding corrupt entry");
                if let Err(e) = self.backend.remove_entry(&bad).await {
                    warn!(key = %bad, error = %e, "Failed to remove corrupt entry");
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads `key` and applies the version and TTL checks. A version mismatch
    /// deletes the entry.
    async fn live_entry(&self, key: &str, ttl: Ttl) -> Result<Option<Entry<T>>> {
        let Some(entry) = self.load(key).await? else {
            return Ok(None);
        };

        if !entry.matches_version(self.version.as_ref()) {
            debug!(key, "Deleting entry written under another version");
            self.delete(key).await?;
            return Ok(None);
        }

        if entry.is_expired(ttl, self.clock.now_ms()) {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Streams raw entries, optionally dropping invalid ones. Corrupt and
    /// (when checking) invalid keys are collected and handed to
    /// [`Store::repair`] once the stream is drained.
    fn scan(&self, check_ttl: bool) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        let rejected: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&rejected);

        let entries = self.backend.raw_entries().filter_map(move |item| {
            let out = match item {
                Ok((key, entry)) => {
                    let valid = !check_ttl
                        || entry.is_live(self.ttl, self.version.as_ref(), self.clock.now_ms());
                    if valid {
                        self.cache_put(&key, &entry);
                        Some(Ok((key, entry)))
                    } else {
                        lock(&sink).push(key);
                        None
                    }
                }
                Err(StoreError::Corrupt { key, .. }) => {
                    lock(&sink).push(key);
                    None
                }
                Err(e) => Some(Err(e)),
            };
            future::ready(out)
        });

        let cleanup = stream::once(async move {
            let keys = std::mem::take(&mut *lock(&rejected));
            self.repair(keys);
            None::<Result<(String, Entry<T>)>>
        })
        .filter_map(future::ready);

        entries.chain(cleanup).boxed()
    }

    /// Fire-and-forget removal of entries found invalid during a scan.
    ///
    /// Each key is reloaded before removal and kept if it was rewritten with
    /// a live entry since the scan. Failures are logged and never reach the
    /// caller.
    fn repair(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        self.cache_delete_all(&keys);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(count = keys.len(), "No runtime for read-repair, skipping");
            return;
        };

        let backend = Arc::clone(&self.backend);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;
        let version = self.version.clone();
        handle.spawn(async move {
            let mut invalid = Vec::with_capacity(keys.len());
            for key in keys {
                match backend.load_entry(&key).await {
                    Ok(Some(entry)) if entry.is_live(ttl, version.as_ref(), clock.now_ms()) => {}
                    Ok(None) => {}
                    Ok(Some(_)) | Err(StoreError::Corrupt { .. }) => invalid.push(key),
                    Err(e) => warn!(key = %key, error = %e, "Read-repair reload failed"),
                }
            }
            if invalid.is_empty() {
                return;
            }

            match backend.remove_entries(&invalid).await {
                Ok(()) => debug!(count = invalid.len(), "Read-repair removed invalid entries"),
                Err(e) => warn!(count = invalid.len(), error = %e, "Read-repair failed"),
            }
        });
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone, B> fmt::Debug for Store<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache_limit = lock(&self.accelerator).as_ref().map(|c| c.limit());
        f.debug_struct("Store")
            .field("ttl", &self.ttl)
            .field("version", &self.version)
            .field("cache_limit", &cache_limit)
            .finish_non_exhaustive()
    }
}
