//! # Request Classifier
//!
//! Pure mapping from an intercepted request to the strategy that will
//! answer it. Rules are evaluated in order and the first match wins.

use std::fmt;

use reqwest::Method;

use crate::config::WorkerConfig;
use crate::request::{Destination, RequestDescriptor, RequestMode};

/// How a request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Straight to the network, never cached
    Bypass,
    /// Network, then cached copy, then a synthetic JSON error; never written
    NetworkFirst,
    /// Network, then the cached offline page
    Navigate,
    /// Cached copy, then network (stored into the static namespace)
    CacheFirst,
    /// Cached copy now, refreshed into the dynamic namespace in the background
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Bypass => "bypass",
            Strategy::NetworkFirst => "network-first",
            Strategy::Navigate => "navigate",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assign exactly one strategy to `request`.
pub fn classify(request: &RequestDescriptor, config: &WorkerConfig) -> Strategy {
    if request.method != Method::GET {
        return Strategy::Bypass;
    }

    let path = request.path();
    if path.starts_with(&config.api_prefix) {
        return Strategy::NetworkFirst;
    }

    if request.mode == RequestMode::Navigate {
        return Strategy::Navigate;
    }

    match request.destination {
        Destination::Image | Destination::Script | Destination::Style => Strategy::CacheFirst,
        _ if path.starts_with(&config.static_build_prefix) => Strategy::CacheFirst,
        _ => Strategy::StaleWhileRevalidate,
    }
}
