//! Shared Medium Backend
//!
//! A string-to-string medium that many stores share, each store seeing only
//! the keys under its own namespace prefix. Entries are stored as JSON, so a
//! record written by something else can fail to decode.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::backend::Backend;
use crate::cache::Entry;
use crate::error::{Result, StoreError};

/// Separator between the namespace and the caller's key.
pub const NAMESPACE_SEPARATOR: char = ':';

// == Shared Medium ==
/// Physical key-value medium holding serialized records.
///
/// Clones are handles to the same storage.
#[derive(Debug, Clone, Default)]
pub struct SharedMedium {
    records: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SharedMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, storage_key: &str) -> Option<String> {
        self.records.read().await.get(storage_key).cloned()
    }

    /// Writes a raw record, bypassing any store.
    pub async fn insert(&self, storage_key: impl Into<String>, record: impl Into<String>) {
        self.records
            .write()
            .await
            .insert(storage_key.into(), record.into());
    }

    pub async fn remove(&self, storage_key: &str) -> Option<String> {
        self.records.write().await.remove(storage_key)
    }

    /// Total records across every namespace.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

// == Shared Medium Backend ==
/// Namespaced view of a [`SharedMedium`].
#[derive(Debug)]
pub struct SharedMediumBackend<T> {
    medium: SharedMedium,
    prefix: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> SharedMediumBackend<T> {
    /// Attaches to `medium` under `namespace`.
    ///
    /// An empty or blank namespace is rejected, as is one containing
    /// [`NAMESPACE_SEPARATOR`], whose prefix would overlap another namespace.
    pub fn new(medium: SharedMedium, namespace: &str) -> Result<Self> {
        validate_namespace(namespace)?;

        Ok(Self {
            medium,
            prefix: format!("{}{}", namespace, NAMESPACE_SEPARATOR),
            _value: PhantomData,
        })
    }

    /// Returns the key a caller's key is stored under on the medium.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn namespace(&self) -> &str {
        self.prefix.trim_end_matches(NAMESPACE_SEPARATOR)
    }

    fn strip<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.prefix.as_str())
    }

    /// Snapshot of this namespace's records as (caller key, raw record).
    async fn scoped_records(&self) -> Vec<(String, String)> {
        self.medium
            .records
            .read()
            .await
            .range(self.prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(self.prefix.as_str()))
            .filter_map(|(k, v)| self.strip(k).map(|key| (key.to_string(), v.clone())))
            .collect()
    }
}

/// Rejects namespaces that are blank or contain [`NAMESPACE_SEPARATOR`].
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(StoreError::InvalidConfig(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.contains(NAMESPACE_SEPARATOR) {
        return Err(StoreError::InvalidConfig(format!(
            "namespace '{}' must not contain '{}'",
            namespace, NAMESPACE_SEPARATOR
        )));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(key: &str, record: &str) -> Result<Entry<T>> {
    serde_json::from_str(record).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl<T> Backend<T> for SharedMediumBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load_entry(&self, key: &str) -> Result<Option<Entry<T>>> {
        match self.medium.get(&self.storage_key(key)).await {
            Some(record) => decode(key, &record).map(Some),
            None => Ok(None),
        }
    }

    async fn save_entry(&self, key: &str, entry: &Entry<T>) -> Result<()> {
        let record = serde_json::to_string(entry)?;
        self.medium.insert(self.storage_key(key), record).await;
        Ok(())
    }

    async fn remove_entry(&self, key: &str) -> Result<()> {
        self.medium.remove(&self.storage_key(key)).await;
        Ok(())
    }

    async fn save_entries(&self, entries: &[(String, Entry<T>)]) -> Result<()> {
        // Encode the whole batch before writing any of it
        let records = entries
            .iter()
            .map(|(key, entry)| -> Result<(String, String)> {
                Ok((self.storage_key(key), serde_json::to_string(entry)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut map = self.medium.records.write().await;
        map.extend(records);
        Ok(())
    }

    async fn remove_entries(&self, keys: &[String]) -> Result<()> {
        let mut map = self.medium.records.write().await;
        for key in keys {
            map.remove(&self.storage_key(key));
        }
        Ok(())
    }

    fn raw_keys(&self) -> BoxStream<'_, Result<String>> {
        stream::once(async move {
            let keys: Vec<Result<String>> = self
                .scoped_records()
                .await
                .into_iter()
                .map(|(key, _)| Ok(key))
                .collect();
            stream::iter(keys)
        })
        .flatten()
        .boxed()
    }

    fn raw_entries(&self) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        stream::once(async move { stream::iter(self.scoped_records().await) })
            .flatten()
            .map(|(key, record)| decode(&key, &record).map(|entry| (key, entry)))
            .boxed()
    }

    async fn clear(&self) -> Result<()> {
        let prefix = self.prefix.as_str();
        self.medium
            .records
            .write()
            .await
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
