//! # Cache Trimmer
//!
//! Bounds a namespace to a maximum entry count by evicting the oldest
//! entries by insertion order. Re-fetching a key appends it anew, so reads
//! alone never protect an entry from eviction.

use tracing::debug;

use crate::cache::CacheProvider;
use crate::error::CacheResult;

#[derive(Debug, Default)]
pub struct CacheTrimmer {
    // One trim pass at a time so concurrent passes cannot over-evict.
    lock: tokio::sync::Mutex<()>,
}

impl CacheTrimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete oldest entries of `namespace` until at most `max_entries`
    /// remain. Returns the number of evicted entries.
    pub async fn trim(
        &self,
        provider: &dyn CacheProvider,
        namespace: &str,
        max_entries: usize,
    ) -> CacheResult<usize> {
        let _pass = self.lock.lock().await;
        let mut evicted = 0;

        while provider.len(namespace).await? > max_entries {
            let Some(oldest) = provider.oldest(namespace).await? else {
                break;
            };
            if provider.remove(namespace, &oldest).await? {
                debug!(namespace, key = %oldest, "Evicted oldest cache entry");
                evicted += 1;
            }
        }

        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheMetadata, MemoryCache};
    use crate::request::RequestKey;
    use bytes::Bytes;
    use url::Url;

    fn key(n: usize) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("http://localhost/item/{n}")).unwrap())
    }

    async fn fill(provider: &MemoryCache, count: usize) {
        for n in 0..count {
            provider
                .put(
                    "dyn",
                    CacheEntry {
                        key: key(n),
                        status: 200,
                        headers: Vec::new(),
                        metadata: CacheMetadata::new(1),
                        body: Bytes::from_static(b"x"),
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_over_limit_evicts_exactly_one() {
        let provider = MemoryCache::new();
        fill(&provider, 6).await;

        let evicted = CacheTrimmer::new().trim(&provider, "dyn", 5).await.unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(provider.len("dyn").await.unwrap(), 5);
        assert_eq!(provider.oldest("dyn").await.unwrap(), Some(key(1)));
    }

    #[tokio::test]
    async fn test_at_or_under_limit_is_noop() {
        let provider = MemoryCache::new();
        fill(&provider, 5).await;

        let trimmer = CacheTrimmer::new();
        assert_eq!(trimmer.trim(&provider, "dyn", 5).await.unwrap(), 0);
        assert_eq!(trimmer.trim(&provider, "dyn", 8).await.unwrap(), 0);
        assert_eq!(provider.len("dyn").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_halving_pass_evicts_oldest_half() {
        let provider = MemoryCache::new();
        fill(&provider, 10).await;

        let evicted = CacheTrimmer::new().trim(&provider, "dyn", 5).await.unwrap();
        assert_eq!(evicted, 5);
        assert_eq!(
            provider.keys("dyn").await.unwrap(),
            (5..10).map(key).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_missing_namespace_is_noop() {
        let provider = MemoryCache::new();
        assert_eq!(CacheTrimmer::new().trim(&provider, "none", 0).await.unwrap(), 0);
    }
}
