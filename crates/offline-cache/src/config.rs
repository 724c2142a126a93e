use std::time::Duration;

use reqwest::header::HeaderMap;
use url::Url;

use crate::builder::{FetchConfigBuilder, WorkerConfigBuilder};
use crate::cache::NamespaceRole;
use crate::error::CacheResult;

const DEFAULT_USER_AGENT: &str = concat!("offline-cache/", env!("CARGO_PKG_VERSION"));

/// Assets written into the static namespace at install time.
pub const DEFAULT_STATIC_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/offline.html",
    "/logo.png",
    "/logo-192.png",
    "/logo-384.png",
    "/logo-512.png",
    "/apple-touch-icon.png",
    "/favicon.ico",
    "/_next/static/css/app.css",
];

/// Configuration of a single worker version.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin the page is served from; asset paths are resolved against it
    pub origin: Url,

    /// Namespace family shared by every version of this application
    pub family: String,

    /// Version token baked into the current namespace names
    pub version: String,

    /// Paths cached during installation
    pub static_assets: Vec<String>,

    /// Requests under this prefix are network-first and never cached
    pub api_prefix: String,

    /// Build output prefix that is always served cache-first
    pub static_build_prefix: String,

    /// Page served when a navigation fails
    pub offline_page: String,

    /// Image served when an image request fails and is not cached
    pub fallback_icon: String,

    /// Upper bound on the number of entries in the dynamic namespace
    pub max_dynamic_entries: usize,

    /// Periodic sync tag that triggers the maintenance trim
    pub cleanup_tag: String,

    /// Activate right after a successful install instead of waiting
    pub skip_waiting_on_install: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:3000/").expect("static origin URL is valid"),
            family: "codxai".to_owned(),
            version: "v3".to_owned(),
            static_assets: DEFAULT_STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
            api_prefix: "/api/".to_owned(),
            static_build_prefix: "/_next/static/".to_owned(),
            offline_page: "/offline.html".to_owned(),
            fallback_icon: "/logo-192.png".to_owned(),
            max_dynamic_entries: 50,
            cleanup_tag: "cache-cleanup".to_owned(),
            skip_waiting_on_install: true,
        }
    }
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::new()
    }

    /// Prefix shared by every namespace of this application, any version.
    pub fn family_prefix(&self) -> String {
        format!("{}-", self.family)
    }

    /// Current namespace name for a role, e.g. `codxai-v3-static`.
    pub fn namespace(&self, role: NamespaceRole) -> String {
        format!("{}-{}-{}", self.family, self.version, role.as_str())
    }

    pub fn static_namespace(&self) -> String {
        self.namespace(NamespaceRole::Static)
    }

    pub fn dynamic_namespace(&self) -> String {
        self.namespace(NamespaceRole::Dynamic)
    }

    /// Resolve a site-relative path against the configured origin.
    pub fn resolve(&self, path: &str) -> CacheResult<Url> {
        Ok(self.origin.join(path)?)
    }
}

/// Options for the HTTP client behind the strategies.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall timeout for one upstream request
    pub timeout: Duration,

    /// Time allowed to establish the connection
    pub connect_timeout: Duration,

    /// How long idle pooled connections are kept
    pub pool_idle_timeout: Duration,

    /// Whether the client follows redirects itself
    pub follow_redirects: bool,

    /// User agent used when the intercepted request carries none
    pub user_agent: String,

    /// Headers added to every upstream request
    pub headers: HeaderMap,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            // The page must see redirects itself, as it would without the worker.
            follow_redirects: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::new()
    }
}
