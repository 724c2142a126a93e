//! # Cache Provider
//!
//! This module defines the storage trait behind the cache store manager.
//! A provider holds any number of named namespaces, each an
//! insertion-ordered map from request key to captured response.

use async_trait::async_trait;

use crate::cache::types::{CacheEntry, CacheLookupResult};
use crate::error::CacheResult;
use crate::request::RequestKey;

#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Create the namespace if it does not exist yet
    async fn open(&self, namespace: &str) -> CacheResult<()>;

    /// Whether the namespace exists
    async fn has(&self, namespace: &str) -> CacheResult<bool>;

    /// Names of all existing namespaces
    async fn namespaces(&self) -> CacheResult<Vec<String>>;

    /// Delete a namespace with all its entries. Returns whether it existed.
    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool>;

    /// Look up an entry by exact key
    async fn get(&self, namespace: &str, key: &RequestKey) -> CacheLookupResult;

    /// Store an entry, opening the namespace if needed. The write is atomic
    /// and moves the key to the back of the insertion order.
    async fn put(&self, namespace: &str, entry: CacheEntry) -> CacheResult<()>;

    /// Remove one entry. Returns whether it existed.
    async fn remove(&self, namespace: &str, key: &RequestKey) -> CacheResult<bool>;

    /// Keys in insertion order, oldest first
    async fn keys(&self, namespace: &str) -> CacheResult<Vec<RequestKey>>;

    /// Oldest key by insertion order
    async fn oldest(&self, namespace: &str) -> CacheResult<Option<RequestKey>>;

    /// Number of entries
    async fn len(&self, namespace: &str) -> CacheResult<usize>;
}
