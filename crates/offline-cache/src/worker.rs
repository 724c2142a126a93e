//! # Worker lifecycle
//!
//! A [`ServiceWorker`] is one version of the caching layer: it installs its
//! static assets, activates by purging older namespaces and then answers
//! intercepted requests. A [`Registration`] holds the active and waiting
//! workers of a process and swaps them the way a browser does on update.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheProvider, CacheStore};
use crate::classifier::classify;
use crate::config::WorkerConfig;
use crate::error::{CacheError, CacheResult};
use crate::fetch::Fetcher;
use crate::request::RequestDescriptor;
use crate::response::Response;
use crate::strategy::{StrategyExecutor, pass_through};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Control messages a page can post to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate the waiting worker without waiting for pages to close
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

pub struct ServiceWorker {
    id: u64,
    config: Arc<WorkerConfig>,
    fetcher: Arc<dyn Fetcher>,
    executor: StrategyExecutor,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        provider: Arc<dyn CacheProvider>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let config = Arc::new(config);
        let store = CacheStore::new(provider, Arc::clone(&config));
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            executor: StrategyExecutor::new(store, Arc::clone(&fetcher)),
            fetcher,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        self.executor.store()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    fn transition(&self, from: WorkerState, to: WorkerState, action: &'static str) -> CacheResult<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(CacheError::InvalidState(state.to_string(), action));
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }

    /// Populate the static namespace. A failure makes the worker redundant.
    pub async fn install(&self) -> CacheResult<usize> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;
        info!(worker = self.id, version = %self.config.version, "Installing worker");

        match self.store().initialize(self.fetcher.as_ref()).await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                if self.config.skip_waiting_on_install {
                    self.skip_waiting.store(true, Ordering::Release);
                }
                Ok(count)
            }
            Err(e) => {
                error!(worker = self.id, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Purge namespaces of older versions and take control of all pages.
    pub async fn activate(&self) -> CacheResult<Vec<String>> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;

        match self.store().activate_latest().await {
            Ok(deleted) => {
                self.set_state(WorkerState::Activated);
                info!(
                    worker = self.id,
                    version = %self.config.version,
                    purged = deleted.len(),
                    "Worker activated, claiming clients"
                );
                Ok(deleted)
            }
            Err(e) => {
                error!(worker = self.id, error = %e, "Activation failed");
                self.retire();
                Err(e)
            }
        }
    }

    /// Answer an intercepted request. Until activation nothing is cached
    /// and requests go straight to the network.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Response {
        if self.state() != WorkerState::Activated {
            return pass_through(self.fetcher.as_ref(), request).await;
        }

        let strategy = classify(request, &self.config);
        debug!(method = %request.method, url = %request.url, %strategy, "Routing request");
        self.executor.execute(strategy, request).await
    }

    /// Returns whether the message asked to skip waiting.
    pub fn handle_message(&self, message: &WorkerMessage) -> bool {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                true
            }
            WorkerMessage::Unknown => {
                debug!(worker = self.id, "Ignoring unknown message");
                false
            }
        }
    }

    pub fn should_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Run the maintenance trim for the configured tag, halving the cap.
    pub async fn handle_periodic_sync(&self, tag: &str) -> CacheResult<usize> {
        if tag != self.config.cleanup_tag {
            debug!(tag, "Ignoring periodic sync");
            return Ok(0);
        }

        let evicted = self
            .store()
            .trim_dynamic(self.config.max_dynamic_entries / 2)
            .await?;
        info!(worker = self.id, evicted, "Maintenance trim finished");
        Ok(evicted)
    }

    /// Wait for background refreshes to finish.
    pub async fn settle(&self) {
        self.executor.settle().await;
    }

    /// Stop writing to the cache and mark the worker redundant.
    pub fn retire(&self) {
        self.store().retire();
        self.set_state(WorkerState::Redundant);
    }
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.config.version)
            .field("state", &self.state())
            .finish()
    }
}

/// The active and waiting workers of one process.
pub struct Registration {
    provider: Arc<dyn CacheProvider>,
    fetcher: Arc<dyn Fetcher>,
    active: RwLock<Option<Arc<ServiceWorker>>>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
    // Serializes install and promotion
    lifecycle: tokio::sync::Mutex<()>,
}

impl Registration {
    pub fn new(provider: Arc<dyn CacheProvider>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            provider,
            fetcher,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.active.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.waiting.read().clone()
    }

    /// Install a worker for `config`.
    ///
    /// On failure the current active worker keeps control. On success the
    /// new worker waits, and is promoted right away when nothing is active
    /// or it asked to skip waiting.
    pub async fn register(&self, config: WorkerConfig) -> CacheResult<Arc<ServiceWorker>> {
        let _guard = self.lifecycle.lock().await;

        let worker = Arc::new(ServiceWorker::new(
            config,
            Arc::clone(&self.provider),
            Arc::clone(&self.fetcher),
        ));
        if let Err(e) = worker.install().await {
            if let Some(active) = self.active() {
                warn!(active = active.id(), "Keeping current worker after failed install");
            }
            return Err(e);
        }

        if let Some(previous) = self.waiting.write().replace(Arc::clone(&worker)) {
            debug!(worker = previous.id(), "Replaced waiting worker");
            previous.retire();
        }

        if self.active().is_none() || worker.should_skip_waiting() {
            self.promote().await?;
        } else {
            info!(worker = worker.id(), "Worker installed and waiting");
        }
        Ok(worker)
    }

    /// Promote the waiting worker, if any. Returns whether one was promoted.
    pub async fn skip_waiting(&self) -> CacheResult<bool> {
        let _guard = self.lifecycle.lock().await;
        if self.waiting.read().is_none() {
            return Ok(false);
        }
        self.promote().await?;
        Ok(true)
    }

    // Caller holds the lifecycle lock.
    async fn promote(&self) -> CacheResult<()> {
        let Some(next) = self.waiting.write().take() else {
            return Ok(());
        };

        let previous = self.active.write().take();
        if let Some(previous) = previous {
            previous.retire();
            previous.settle().await;
            debug!(worker = previous.id(), "Previous worker is redundant");
        }

        next.activate().await?;
        *self.active.write() = Some(next);
        Ok(())
    }

    /// Deliver a page message. `SKIP_WAITING` promotes the waiting worker.
    pub async fn handle_message(&self, message: &WorkerMessage) -> CacheResult<bool> {
        let target = self.waiting().or_else(|| self.active());
        match target {
            Some(worker) if worker.handle_message(message) => self.skip_waiting().await,
            _ => Ok(false),
        }
    }

    /// Route a request through the active worker, or straight to the
    /// network when there is none.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Response {
        match self.active() {
            Some(worker) => worker.handle_fetch(request).await,
            None => pass_through(self.fetcher.as_ref(), request).await,
        }
    }

    pub async fn handle_periodic_sync(&self, tag: &str) -> CacheResult<usize> {
        match self.active() {
            Some(worker) => worker.handle_periodic_sync(tag).await,
            None => Ok(0),
        }
    }

    pub async fn settle(&self) {
        if let Some(worker) = self.active() {
            worker.settle().await;
        }
    }

    /// Retire every worker and delete their namespaces.
    pub async fn unregister(&self) -> CacheResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;

        let mut deleted = Vec::new();
        let waiting = self.waiting.write().take();
        let active = self.active.write().take();
        for worker in waiting.into_iter().chain(active) {
            worker.retire();
            worker.settle().await;
            deleted.extend(worker.store().teardown().await?);
        }
        info!(namespaces = deleted.len(), "Unregistered workers");
        Ok(deleted)
    }
}
