//! # Strategy Executor
//!
//! The fetch-and-cache algorithms behind each [`Strategy`]. Every strategy
//! answers with a [`Response`]: transport failures become cached copies,
//! fallback assets or synthetic responses, never errors.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::chat::{ChatErrorBody, ChatErrorKind};
use crate::classifier::Strategy;
use crate::fetch::Fetcher;
use crate::request::{Destination, RequestDescriptor};
use crate::response::Response;

pub struct StrategyExecutor {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    /// Background refreshes started by stale-while-revalidate
    revalidations: TaskTracker,
}

impl StrategyExecutor {
    pub fn new(store: CacheStore, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            revalidations: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub async fn execute(&self, strategy: Strategy, request: &RequestDescriptor) -> Response {
        match strategy {
            Strategy::Bypass => pass_through(self.fetcher.as_ref(), request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::Navigate => self.navigate(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Wait until every background refresh started so far has finished.
    pub async fn settle(&self) {
        self.revalidations.close();
        self.revalidations.wait().await;
        self.revalidations.reopen();
    }

    /// Number of background refreshes still running
    pub fn pending(&self) -> usize {
        self.revalidations.len()
    }

    async fn network_first(&self, request: &RequestDescriptor) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if !response.is_success() {
                    log_api_error(request, &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network-first fetch failed, trying cache");
                match self.store.match_any(&request.key()).await {
                    Some(cached) => cached,
                    None => Response::network_unavailable(),
                }
            }
        }
    }

    async fn navigate(&self, request: &RequestDescriptor) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                let offline_page = &self.store.config().offline_page;
                debug!(url = %request.url, error = %e, "Navigation failed, serving {offline_page}");
                match self.store.match_path(offline_page).await {
                    Some(page) => page,
                    None => Response::unavailable_offline(),
                }
            }
        }
    }

    async fn cache_first(&self, request: &RequestDescriptor) -> Response {
        let key = request.key();
        if let Some(cached) = self.store.match_any(&key).await {
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(e) = self.store.put_static(key, &response).await {
                        warn!(url = %request.url, error = %e, "Failed to cache static response");
                    }
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache-first fetch failed");
                if request.destination == Destination::Image {
                    let icon = &self.store.config().fallback_icon;
                    if let Some(icon) = self.store.match_path(icon).await {
                        return icon;
                    }
                }
                Response::unavailable_offline()
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &RequestDescriptor) -> Response {
        if let Some(cached) = self.store.match_any(&request.key()).await {
            let store = self.store.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let request = request.clone();
            self.revalidations.spawn(async move {
                revalidate(&store, fetcher.as_ref(), &request).await;
            });
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store_dynamic(&self.store, request, &response).await;
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Revalidating fetch failed with nothing cached");
                Response::network_error()
            }
        }
    }
}

/// Forward to the network untouched. A missing answer becomes a `502`.
pub(crate) async fn pass_through(fetcher: &dyn Fetcher, request: &RequestDescriptor) -> Response {
    match fetcher.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(method = %request.method, url = %request.url, error = %e, "Upstream unreachable");
            Response::bad_gateway(e)
        }
    }
}

async fn revalidate(store: &CacheStore, fetcher: &dyn Fetcher, request: &RequestDescriptor) {
    match fetcher.fetch(request).await {
        Ok(response) => store_dynamic(store, request, &response).await,
        Err(e) => debug!(url = %request.url, error = %e, "Background refresh failed"),
    }
}

async fn store_dynamic(store: &CacheStore, request: &RequestDescriptor, response: &Response) {
    if !response.is_success() {
        debug!(url = %request.url, status = response.status.as_u16(), "Not caching error response");
        return;
    }

    match store.put_dynamic(request.key(), response).await {
        Ok(evicted) if evicted > 0 => debug!(url = %request.url, evicted, "Refreshed and trimmed"),
        Ok(_) => debug!(url = %request.url, "Refreshed"),
        Err(e) => warn!(url = %request.url, error = %e, "Failed to cache dynamic response"),
    }
}

fn log_api_error(request: &RequestDescriptor, response: &Response) {
    let kind = ChatErrorKind::from_status(response.status);
    let reason = serde_json::from_slice::<ChatErrorBody>(&response.body)
        .map(|body| body.error)
        .unwrap_or_default();
    warn!(
        url = %request.url,
        status = response.status.as_u16(),
        kind = kind.as_str(),
        reason = %reason,
        "API request failed"
    );
}
