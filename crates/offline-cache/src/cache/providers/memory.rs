//! # Memory Cache Provider
//!
//! Process-local namespaces. Each namespace is guarded by one lock, so a
//! write (entry plus index slot) is never observed half done.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::cache::index::OrderedIndex;
use crate::cache::providers::CacheProvider;
use crate::cache::types::{CacheEntry, CacheLookupResult};
use crate::error::CacheResult;
use crate::request::RequestKey;

#[derive(Debug, Default)]
struct Namespace {
    entries: HashMap<RequestKey, CacheEntry>,
    index: OrderedIndex,
}

/// In-memory provider, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryCache {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheProvider for MemoryCache {
    async fn open(&self, namespace: &str) -> CacheResult<()> {
        let mut namespaces = self.namespaces.write();
        if !namespaces.contains_key(namespace) {
            namespaces.insert(namespace.to_owned(), Namespace::default());
            debug!(namespace, "Created memory namespace");
        }
        Ok(())
    }

    async fn has(&self, namespace: &str) -> CacheResult<bool> {
        Ok(self.namespaces.read().contains_key(namespace))
    }

    async fn namespaces(&self) -> CacheResult<Vec<String>> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool> {
        let removed = self.namespaces.write().remove(namespace).is_some();
        if removed {
            debug!(namespace, "Deleted memory namespace");
        }
        Ok(removed)
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> CacheLookupResult {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.entries.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, mut entry: CacheEntry) -> CacheResult<()> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces.entry(namespace.to_owned()).or_default();

        let sequence = ns.index.push(entry.key.clone());
        entry.metadata.sequence = sequence;
        ns.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &RequestKey) -> CacheResult<bool> {
        let mut namespaces = self.namespaces.write();
        let Some(ns) = namespaces.get_mut(namespace) else {
            return Ok(false);
        };

        ns.index.remove(key);
        Ok(ns.entries.remove(key).is_some())
    }

    async fn keys(&self, namespace: &str) -> CacheResult<Vec<RequestKey>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.index.keys())
            .unwrap_or_default())
    }

    async fn oldest(&self, namespace: &str) -> CacheResult<Option<RequestKey>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.index.oldest().cloned()))
    }

    async fn len(&self, namespace: &str) -> CacheResult<usize> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.entries.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::CacheMetadata;
    use bytes::Bytes;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("http://localhost").unwrap().join(path).unwrap())
    }

    fn entry(path: &str, body: &'static str) -> CacheEntry {
        CacheEntry {
            key: key(path),
            status: 200,
            headers: vec![("content-type".to_owned(), "text/plain".to_owned())],
            metadata: CacheMetadata::new(body.len() as u64),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_put_get_hit() {
        let cache = MemoryCache::new();
        cache.put("ns", entry("/a", "hello")).await.unwrap();

        let found = cache.get("ns", &key("/a")).await.unwrap().expect("entry");
        assert_eq!(found.body, Bytes::from_static(b"hello"));
        assert_eq!(found.status, 200);
    }

    #[tokio::test]
    async fn test_get_miss_and_unknown_namespace() {
        let cache = MemoryCache::new();
        cache.open("ns").await.unwrap();

        assert!(cache.get("ns", &key("/missing")).await.unwrap().is_none());
        assert!(cache.get("other", &key("/missing")).await.unwrap().is_none());
        assert_eq!(cache.len("other").await.unwrap(), 0);
        assert!(!cache.has("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_opens_namespace() {
        let cache = MemoryCache::new();
        cache.put("fresh", entry("/a", "x")).await.unwrap();
        assert!(cache.has("fresh").await.unwrap());
        assert_eq!(cache.namespaces().await.unwrap(), vec!["fresh".to_owned()]);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_moves_to_back() {
        let cache = MemoryCache::new();
        cache.put("ns", entry("/a", "old")).await.unwrap();
        cache.put("ns", entry("/b", "b")).await.unwrap();
        cache.put("ns", entry("/a", "new")).await.unwrap();

        assert_eq!(cache.len("ns").await.unwrap(), 2);
        assert_eq!(cache.keys("ns").await.unwrap(), vec![key("/b"), key("/a")]);
        assert_eq!(cache.oldest("ns").await.unwrap(), Some(key("/b")));

        let found = cache.get("ns", &key("/a")).await.unwrap().unwrap();
        assert_eq!(found.body, Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn test_remove_and_delete_namespace() {
        let cache = MemoryCache::new();
        cache.put("ns", entry("/a", "a")).await.unwrap();

        assert!(cache.remove("ns", &key("/a")).await.unwrap());
        assert!(!cache.remove("ns", &key("/a")).await.unwrap());
        assert!(cache.oldest("ns").await.unwrap().is_none());

        assert!(cache.delete_namespace("ns").await.unwrap());
        assert!(!cache.delete_namespace("ns").await.unwrap());
    }
}
