//! # Configuration builders
//!
//! Fluent builders for [`WorkerConfig`] and [`FetchConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use offline_cache::{FetchConfig, WorkerConfig};
//!
//! let worker = WorkerConfig::builder()
//!     .with_origin("http://127.0.0.1:3000".parse().unwrap())
//!     .with_family("codxai")
//!     .with_version("v4")
//!     .with_max_dynamic_entries(100)
//!     .build();
//!
//! assert_eq!(worker.static_namespace(), "codxai-v4-static");
//!
//! let fetch = FetchConfig::builder()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_header("X-Client", "offline-proxy")
//!     .build();
//! ```

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::config::{FetchConfig, WorkerConfig};

/// Builder for [`WorkerConfig`]
#[derive(Debug, Clone)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: WorkerConfig::default(),
        }
    }

    /// Set the origin that asset paths are resolved against
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.config.origin = origin;
        self
    }

    /// Set the namespace family shared by all versions
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.config.family = family.into();
        self
    }

    /// Set the version token of the current namespaces
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Replace the list of assets cached at install time
    pub fn with_static_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.static_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    pub fn with_static_build_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.static_build_prefix = prefix.into();
        self
    }

    pub fn with_offline_page(mut self, path: impl Into<String>) -> Self {
        self.config.offline_page = path.into();
        self
    }

    pub fn with_fallback_icon(mut self, path: impl Into<String>) -> Self {
        self.config.fallback_icon = path.into();
        self
    }

    /// Set the entry cap of the dynamic namespace
    pub fn with_max_dynamic_entries(mut self, max: usize) -> Self {
        self.config.max_dynamic_entries = max;
        self
    }

    pub fn with_cleanup_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.cleanup_tag = tag.into();
        self
    }

    /// Activate immediately after install instead of waiting for `SKIP_WAITING`
    pub fn with_skip_waiting(mut self, skip: bool) -> Self {
        self.config.skip_waiting_on_install = skip;
        self
    }

    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

impl Default for WorkerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`FetchConfig`]
#[derive(Debug, Clone)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FetchConfig::default(),
        }
    }

    /// Set the overall timeout for one upstream request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every upstream request.
    /// Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    pub fn build(self) -> FetchConfig {
        self.config
    }
}

impl Default for FetchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
