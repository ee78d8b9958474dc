//! In-memory backend holding typed entries in a map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::backend::Backend;
use crate::cache::Entry;
use crate::error::Result;

// == Memory Backend ==
/// Backend keeping entries in a process-local map.
///
/// Clones share the same map. Entries never fail decoding here.
#[derive(Debug)]
pub struct MemoryBackend<T> {
    entries: Arc<RwLock<HashMap<String, Entry<T>>>>,
}

impl<T> MemoryBackend<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored entries, valid or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T> Clone for MemoryBackend<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Backend<T> for MemoryBackend<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load_entry(&self, key: &str) -> Result<Option<Entry<T>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save_entry(&self, key: &str, entry: &Entry<T>) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn remove_entry(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn save_entries(&self, entries: &[(String, Entry<T>)]) -> Result<()> {
        let mut map = self.entries.write().await;
        for (key, entry) in entries {
            map.insert(key.clone(), entry.clone());
        }
        Ok(())
    }

    async fn remove_entries(&self, keys: &[String]) -> Result<()> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    fn raw_keys(&self) -> BoxStream<'_, Result<String>> {
        stream::once(async move {
            let keys: Vec<Result<String>> =
                self.entries.read().await.keys().cloned().map(Ok).collect();
            stream::iter(keys)
        })
        .flatten()
        .boxed()
    }

    fn raw_entries(&self) -> BoxStream<'_, Result<(String, Entry<T>)>> {
        stream::once(async move {
            let entries: Vec<Result<(String, Entry<T>)>> = self
                .entries
                .read()
                .await
                .iter()
                .map(|(k, e)| Ok((k.clone(), e.clone())))
                .collect();
            stream::iter(entries)
        })
        .flatten()
        .boxed()
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
