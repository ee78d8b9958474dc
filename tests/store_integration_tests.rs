//! Integration Tests for the Store
//!
//! Exercises the public store contract over the shipped backends, including
//! several stores sharing one physical medium.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use layered_cache::backend::SharedMediumBackend;
use layered_cache::cache::ManualClock;
use layered_cache::{
    open_store, Backend, BackendKind, Entry, IterOptions, MemoryBackend, SharedMedium, Store,
    StoreConfig, StoreError, Ttl, Version,
};

const T0: u64 = 1_700_000_000_000;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layered_cache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn shared_store(
    medium: &SharedMedium,
    namespace: &str,
    ttl: Ttl,
    version: Option<Version>,
    clock: &ManualClock,
) -> Store<i64, SharedMediumBackend<i64>> {
    let backend = SharedMediumBackend::new(medium.clone(), namespace).unwrap();
    Store::new(backend, ttl, version).with_clock(clock.clone())
}

/// Wraps a backend and counts calls that reach it.
struct CountingBackend<B> {
    inner: B,
    loads: Arc<AtomicUsize>,
    batch_saves: Arc<AtomicUsize>,
    batch_removes: Arc<AtomicUsize>,
}

impl<B> CountingBackend<B> {
    fn new(inner: B) -> Self {
        Self {
            inner,
            loads: Arc::default(),
            batch_saves: Arc::default(),
            batch_removes: Arc::default(),
        }
    }
}

#[async_trait]
impl<B: Backend<i64>> Backend<i64> for CountingBackend<B> {
    async fn load_entry(&self, key: &str) -> layered_cache::Result<Option<Entry<i64>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_entry(key).await
    }

    async fn save_entry(&self, key: &str, entry: &Entry<i64>) -> layered_cache::Result<()> {
        self.inner.save_entry(key, entry).await
    }

    async fn remove_entry(&self, key: &str) -> layered_cache::Result<()> {
        self.inner.remove_entry(key).await
    }

    async fn save_entries(&self, entries: &[(String, Entry<i64>)]) -> layered_cache::Result<()> {
        self.batch_saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_entries(entries).await
    }

    async fn remove_entries(&self, keys: &[String]) -> layered_cache::Result<()> {
        self.batch_removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_entries(keys).await
    }

    fn raw_keys(&self) -> BoxStream<'_, layered_cache::Result<String>> {
        self.inner.raw_keys()
    }

    fn raw_entries(&self) -> BoxStream<'_, layered_cache::Result<(String, Entry<i64>)>> {
        self.inner.raw_entries()
    }
}

/// Backend whose removals always fail, for best-effort paths.
struct FailingRemoves(MemoryBackend<i64>);

#[async_trait]
impl Backend<i64> for FailingRemoves {
    async fn load_entry(&self, key: &str) -> layered_cache::Result<Option<Entry<i64>>> {
        self.0.load_entry(key).await
    }

    async fn save_entry(&self, key: &str, entry: &Entry<i64>) -> layered_cache::Result<()> {
        self.0.save_entry(key, entry).await
    }

    async fn remove_entry(&self, _key: &str) -> layered_cache::Result<()> {
        Err(StoreError::Backend("read-only".to_string()))
    }

    fn raw_keys(&self) -> BoxStream<'_, layered_cache::Result<String>> {
        self.0.raw_keys()
    }

    fn raw_entries(&self) -> BoxStream<'_, layered_cache::Result<(String, Entry<i64>)>> {
        self.0.raw_entries()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// == Read / Write Contract ==

#[tokio::test]
async fn test_set_then_get_until_delete() -> anyhow::Result<()> {
    init_tracing();
    let medium = SharedMedium::new();
    let store = shared_store(&medium, "app", Ttl::Forever, None, &ManualClock::new(T0));

    store.set("k", Some(5)).await?;
    assert_eq!(store.get("k").await?, Some(5));
    assert!(store.has("k").await?);

    store.delete("k").await?;
    assert_eq!(store.get("k").await?, None);
    assert!(!store.has("k").await?);
    Ok(())
}

#[tokio::test]
async fn test_set_absent_is_delete() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let store = shared_store(&medium, "app", Ttl::Forever, None, &ManualClock::new(T0));

    store.set("k", Some(5)).await?;
    assert!(store.set("k", None).await?.is_none());

    assert_eq!(store.get("k").await?, None);
    assert!(!store.has("k").await?);
    assert!(medium.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_ttl_boundary_ten_millis() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let store = shared_store(&medium, "app", Ttl::Millis(10), None, &clock);

    store.set("k", Some(1)).await?;

    clock.set(T0 + 9);
    assert_eq!(store.get("k").await?, Some(1));
    clock.set(T0 + 10);
    assert_eq!(store.get("k").await?, Some(1));
    clock.set(T0 + 11);
    assert_eq!(store.get("k").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_version_change_invalidates() -> anyhow::Result<()> {
    init_tracing();
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let v1 = shared_store(&medium, "app", Ttl::Forever, Some(Version::Number(1)), &clock);
    let v2 = shared_store(&medium, "app", Ttl::Forever, Some(Version::Number(2)), &clock);

    v1.set("k", Some(10)).await?;
    assert_eq!(v1.get("k").await?, Some(10));

    assert_eq!(v2.get("k").await?, None);
    assert_eq!(v2.raw_get("k").await?, None);
    assert_eq!(medium.get("app:k").await, None);
    Ok(())
}

#[tokio::test]
async fn test_string_and_number_versions_differ() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let numeric = shared_store(&medium, "app", Ttl::Forever, Some(Version::Number(1)), &clock);
    let text = shared_store(&medium, "app", Ttl::Forever, Some(Version::from("1")), &clock);

    numeric.set("k", Some(1)).await?;
    assert!(!text.has("k").await?);
    assert_eq!(numeric.raw_get("k").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_payload_is_absent_and_removed() -> anyhow::Result<()> {
    init_tracing();
    let medium = SharedMedium::new();
    let store = shared_store(&medium, "app", Ttl::Forever, None, &ManualClock::new(T0));
    let storage_key = store.backend().storage_key("k");

    medium.insert(storage_key.clone(), "{\"time\": oops").await;
    assert_eq!(store.get("k").await?, None);
    assert_eq!(store.raw_get("k").await?, None);
    assert_eq!(medium.get(&storage_key).await, None);

    // Well-formed JSON missing required fields is just as corrupt
    medium.insert(storage_key.clone(), r#"{"value": 3}"#).await;
    assert!(!store.has("k").await?);
    assert_eq!(medium.get(&storage_key).await, None);
    Ok(())
}

#[tokio::test]
async fn test_read_repair_failure_is_swallowed() -> anyhow::Result<()> {
    init_tracing();
    let clock = ManualClock::new(T0);
    let store = Store::new(FailingRemoves(MemoryBackend::new()), Ttl::Millis(10), None)
        .with_clock(clock.clone());

    store.set("old", Some(1)).await?;
    clock.advance(20);
    store.set("new", Some(2)).await?;

    let entries: Vec<(String, Entry<i64>)> =
        store.entries(IterOptions::checked()).try_collect().await?;
    assert_eq!(entries.len(), 1);
    settle().await;

    // Cleanup failed quietly, the expired entry is still stored
    assert!(store.raw_get("old").await?.is_some());

    // Failures on the explicit delete path still propagate
    assert!(matches!(store.delete("new").await, Err(StoreError::Backend(_))));
    Ok(())
}

#[tokio::test]
async fn test_updated_at() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let v1 = shared_store(&medium, "app", Ttl::Millis(5), Some(Version::Number(1)), &clock);
    let v2 = shared_store(&medium, "app", Ttl::Millis(5), Some(Version::Number(2)), &clock);

    assert_eq!(v1.updated_at("k").await?, 0);

    v1.set("k", Some(1)).await?;
    clock.advance(1_000);

    assert_eq!(v1.updated_at("k").await?, T0);
    assert_eq!(v2.updated_at("k").await?, 0);
    // Still stored: updated_at never deletes
    assert!(medium.get("app:k").await.is_some());
    Ok(())
}

// == Batch Writes ==

#[tokio::test]
async fn test_batch_set_mixed() -> anyhow::Result<()> {
    let counting = CountingBackend::new(MemoryBackend::new());
    let saves = Arc::clone(&counting.batch_saves);
    let removes = Arc::clone(&counting.batch_removes);
    let store = Store::new(counting, Ttl::Forever, None).with_clock(ManualClock::new(T0));

    let result = store
        .set_many([("a", Some(1)), ("b", None), ("c", Some(2))])
        .await?;

    let mut keys: Vec<&String> = result.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["a", "c"]);
    assert_eq!(result["a"].time, T0);

    assert_eq!(store.get("b").await?, None);
    assert_eq!(store.get("a").await?, Some(1));
    assert_eq!(store.get("c").await?, Some(2));

    assert_eq!(saves.load(Ordering::SeqCst), 1);
    assert_eq!(removes.load(Ordering::SeqCst), 1);
    Ok(())
}

// == Accelerator ==

#[tokio::test]
async fn test_accelerator_eviction_reaches_backend() -> anyhow::Result<()> {
    let counting = CountingBackend::new(MemoryBackend::new());
    let loads = Arc::clone(&counting.loads);
    let store = Store::new(counting, Ttl::Forever, None).use_cache(2);

    store.set("a", Some(1)).await?;
    store.set("b", Some(2)).await?;
    assert_eq!(store.get("a").await?, Some(1));
    store.set("c", Some(3)).await?;
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    assert_eq!(store.get("a").await?, Some(1));
    assert_eq!(store.get("c").await?, Some(3));
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    assert_eq!(store.get("b").await?, Some(2));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let stats = store.accelerator_stats().expect("accelerator enabled");
    assert_eq!(stats.total_entries, 2);
    assert!(stats.evictions >= 1);
    Ok(())
}

// == Iteration ==

#[tokio::test]
async fn test_keys_checked_excludes_and_removes_expired() -> anyhow::Result<()> {
    init_tracing();
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let store = shared_store(&medium, "app", Ttl::Millis(10), None, &clock);

    store.set("old", Some(1)).await?;
    clock.advance(20);
    store.set("new", Some(2)).await?;

    let mut unchecked: Vec<String> = store.keys(IterOptions::default()).try_collect().await?;
    unchecked.sort();
    assert_eq!(unchecked, vec!["new", "old"]);
    settle().await;
    assert_eq!(medium.len().await, 2);

    let checked: Vec<String> = store.keys(IterOptions::checked()).try_collect().await?;
    assert_eq!(checked, vec!["new"]);
    settle().await;
    assert_eq!(medium.get("app:old").await, None);
    assert_eq!(medium.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_values_and_entries_checked() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let store = shared_store(&medium, "app", Ttl::Forever, Some(Version::Number(2)), &clock);
    let legacy = shared_store(&medium, "app", Ttl::Forever, Some(Version::Number(1)), &clock);

    legacy.set("stale", Some(1)).await?;
    store.set("fresh", Some(2)).await?;
    medium.insert("app:broken", "not json").await;

    let raw: Vec<(String, Entry<i64>)> = store.raw_entries().try_collect().await?;
    assert_eq!(raw.len(), 2);

    let values: Vec<Entry<i64>> = store.values(IterOptions::checked()).try_collect().await?;
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, 2);
    settle().await;

    let entries: Vec<(String, Entry<i64>)> =
        store.entries(IterOptions::default()).try_collect().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "fresh");
    assert_eq!(medium.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_purge_expired_entries() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let store = shared_store(&medium, "app", Ttl::Millis(10), Some(Version::from("b")), &clock)
        .use_cache(8);
    let legacy = shared_store(&medium, "app", Ttl::Millis(10), Some(Version::from("a")), &clock);

    store.set("expired", Some(1)).await?;
    clock.advance(11);
    store.set("live", Some(2)).await?;
    legacy.set("stale", Some(3)).await?;
    medium.insert("app:broken", "[]").await;

    assert_eq!(store.purge_expired_entries().await?, 3);
    assert_eq!(medium.len().await, 1);
    assert_eq!(store.raw_get("expired").await?, None);
    assert_eq!(store.get("live").await?, Some(2));
    Ok(())
}

// == Clear ==

#[tokio::test]
async fn test_clear_is_namespace_scoped() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let users = shared_store(&medium, "users", Ttl::Forever, None, &clock).use_cache(4);
    let posts = shared_store(&medium, "posts", Ttl::Forever, None, &clock);

    users.set("1", Some(1)).await?;
    users.set("2", Some(2)).await?;
    posts.set("1", Some(100)).await?;

    users.clear().await?;

    assert_eq!(users.get("1").await?, None);
    assert_eq!(users.get("2").await?, None);
    assert_eq!(posts.get("1").await?, Some(100));
    assert_eq!(medium.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_nested_namespace_is_rejected() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let clock = ManualClock::new(T0);
    let outer = shared_store(&medium, "a", Ttl::Forever, None, &clock);
    outer.set("x", Some(1)).await?;

    let nested = SharedMediumBackend::<i64>::new(medium.clone(), "a:b");
    assert!(matches!(nested, Err(StoreError::InvalidConfig(_))));

    let config = StoreConfig {
        namespace: "a:b".to_string(),
        backend: BackendKind::Shared,
        ..StoreConfig::default()
    };
    let result = open_store::<i64>(&config, Some(medium.clone()));
    assert!(matches!(result, Err(StoreError::InvalidConfig(_))));

    let keys: Vec<String> = outer.keys(IterOptions::default()).try_collect().await?;
    assert_eq!(keys, vec!["x"]);
    Ok(())
}

// == Factory ==

#[tokio::test]
async fn test_factory_builds_shared_store() -> anyhow::Result<()> {
    let medium = SharedMedium::new();
    let config = StoreConfig {
        namespace: "sessions".to_string(),
        backend: BackendKind::Shared,
        ttl: Ttl::from_millis(60_000),
        version: Some(Version::Number(1)),
        cache_limit: Some(16),
        purge_interval: 60,
    };

    let store = open_store::<String>(&config, Some(medium.clone()))?;
    store.set("token", Some("abc".to_string())).await?;

    assert_eq!(store.get("token").await?, Some("abc".to_string()));
    assert!(medium.get("sessions:token").await.is_some());
    Ok(())
}

#[test]
fn test_factory_rejects_unknown_backend() {
    let err = "websql".parse::<BackendKind>().unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedBackend(_)));
}
