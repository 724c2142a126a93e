//! # Cache Store Manager
//!
//! Owns the versioned namespaces of one worker: populates the static
//! namespace at install, purges older versions at activation, and is the
//! only path through which strategies read or write cached responses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::cache::providers::CacheProvider;
use crate::cache::types::{CacheEntry, NamespaceRole};
use crate::config::WorkerConfig;
use crate::error::{CacheError, CacheResult};
use crate::fetch::Fetcher;
use crate::request::{RequestDescriptor, RequestKey};
use crate::response::{Response, ResponseSource};
use crate::trimmer::CacheTrimmer;

#[derive(Clone)]
pub struct CacheStore {
    provider: Arc<dyn CacheProvider>,
    config: Arc<WorkerConfig>,
    trimmer: Arc<CacheTrimmer>,
    /// Set once the owning worker is replaced; writes become no-ops so a
    /// late background refresh cannot resurrect a purged namespace.
    retired: Arc<AtomicBool>,
}

impl CacheStore {
    pub fn new(provider: Arc<dyn CacheProvider>, config: Arc<WorkerConfig>) -> Self {
        Self {
            provider,
            config,
            trimmer: Arc::new(CacheTrimmer::new()),
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn CacheProvider> {
        &self.provider
    }

    pub fn static_name(&self) -> String {
        self.config.static_namespace()
    }

    pub fn dynamic_name(&self) -> String {
        self.config.dynamic_namespace()
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Fetch every static asset and store them as one batch.
    ///
    /// Nothing is written unless every asset came back with a success
    /// status; the first failure aborts the install. A failed write rolls
    /// back whatever the batch already stored.
    pub async fn initialize(&self, fetcher: &dyn Fetcher) -> CacheResult<usize> {
        let requests = self
            .config
            .static_assets
            .iter()
            .map(|path| {
                self.config
                    .resolve(path)
                    .map(|url| (path.as_str(), RequestDescriptor::get(url)))
            })
            .collect::<CacheResult<Vec<_>>>()?;

        let responses = try_join_all(requests.iter().map(|(path, request)| async move {
            match fetcher.fetch(request).await {
                Ok(response) if response.is_success() => Ok((request.key(), response)),
                Ok(response) => Err(CacheError::Install {
                    asset: path.to_string(),
                    reason: format!("server returned status code {}", response.status),
                }),
                Err(e) => Err(CacheError::Install {
                    asset: path.to_string(),
                    reason: e.to_string(),
                }),
            }
        }))
        .await?;

        let namespace = self.static_name();
        let existed = self.provider.has(&namespace).await?;
        self.provider.open(&namespace).await?;

        let mut written = Vec::with_capacity(responses.len());
        for (key, response) in &responses {
            let stored = self
                .provider
                .put(&namespace, CacheEntry::from_response(key.clone(), response))
                .await;
            if let Err(e) = stored {
                warn!(namespace = %namespace, error = %e, "Static batch failed, rolling back");
                self.roll_back(&namespace, existed, &written).await;
                return Err(e);
            }
            written.push(key);
        }

        info!(namespace = %namespace, assets = responses.len(), "Cached app shell and static assets");
        Ok(responses.len())
    }

    /// Undo a partially written batch. A namespace created by the batch is
    /// dropped whole; a pre-existing one only loses the keys just written.
    async fn roll_back(&self, namespace: &str, existed: bool, written: &[&RequestKey]) {
        let result = if existed {
            let mut result = Ok(());
            for key in written {
                if let Err(e) = self.provider.remove(namespace, key).await {
                    result = Err(e);
                }
            }
            result
        } else {
            self.provider.delete_namespace(namespace).await.map(|_| ())
        };

        if let Err(e) = result {
            warn!(namespace = %namespace, error = %e, "Failed to roll back static batch");
        }
    }

    /// Delete every namespace of this application except the current
    /// static and dynamic ones, then make sure both current ones exist.
    /// Returns the deleted names.
    pub async fn activate_latest(&self) -> CacheResult<Vec<String>> {
        let prefix = self.config.family_prefix();
        let keep = [self.static_name(), self.dynamic_name()];

        let mut deleted = Vec::new();
        for name in self.provider.namespaces().await? {
            if name.starts_with(&prefix) && !keep.contains(&name) {
                info!(namespace = %name, "Deleting old cache");
                if self.provider.delete_namespace(&name).await? {
                    deleted.push(name);
                }
            }
        }

        for name in &keep {
            self.provider.open(name).await?;
        }

        Ok(deleted)
    }

    /// Delete every current namespace of this worker.
    pub async fn teardown(&self) -> CacheResult<Vec<String>> {
        self.retire();

        let mut deleted = Vec::new();
        for name in [self.static_name(), self.dynamic_name()] {
            if self.provider.delete_namespace(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Look a key up across the current namespaces, static first.
    /// Storage errors are logged and treated as a miss.
    pub async fn match_any(&self, key: &RequestKey) -> Option<Response> {
        for namespace in [self.static_name(), self.dynamic_name()] {
            match self.match_in(&namespace, key).await {
                Ok(Some(response)) => return Some(response),
                Ok(None) => {}
                Err(e) => warn!(namespace = %namespace, key = %key, error = %e, "Cache lookup failed"),
            }
        }
        None
    }

    /// Look a key up in one namespace.
    pub async fn match_in(&self, namespace: &str, key: &RequestKey) -> CacheResult<Option<Response>> {
        match self.provider.get(namespace, key).await? {
            Some(entry) => entry.to_response(ResponseSource::Cache).map(Some),
            None => Ok(None),
        }
    }

    /// Look up a site path (offline page, fallback icon) across namespaces.
    pub async fn match_path(&self, path: &str) -> Option<Response> {
        let url = match self.config.resolve(path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path, error = %e, "Invalid fallback path");
                return None;
            }
        };
        self.match_any(&RequestKey::get(&url))
            .await
            .map(|response| response.with_source(ResponseSource::Fallback))
    }

    pub async fn put(&self, role: NamespaceRole, key: RequestKey, response: &Response) -> CacheResult<()> {
        if self.is_retired() {
            debug!(key = %key, "Worker retired, skipping cache write");
            return Ok(());
        }

        let namespace = self.config.namespace(role);
        self.provider
            .put(&namespace, CacheEntry::from_response(key, response))
            .await
    }

    pub async fn put_static(&self, key: RequestKey, response: &Response) -> CacheResult<()> {
        self.put(NamespaceRole::Static, key, response).await
    }

    /// Write into the dynamic namespace and trim it back to the cap.
    /// Returns the number of evicted entries.
    pub async fn put_dynamic(&self, key: RequestKey, response: &Response) -> CacheResult<usize> {
        self.put(NamespaceRole::Dynamic, key, response).await?;
        self.trim_dynamic(self.config.max_dynamic_entries).await
    }

    /// Trim the dynamic namespace to `max_entries`.
    pub async fn trim_dynamic(&self, max_entries: usize) -> CacheResult<usize> {
        let namespace = self.dynamic_name();
        self.trimmer
            .trim(self.provider.as_ref(), &namespace, max_entries)
            .await
    }

    pub async fn entry_count(&self, role: NamespaceRole) -> CacheResult<usize> {
        self.provider.len(&self.config.namespace(role)).await
    }

    pub async fn keys(&self, role: NamespaceRole) -> CacheResult<Vec<RequestKey>> {
        self.provider.keys(&self.config.namespace(role)).await
    }
}
