//! # Offline Cache
//!
//! The offline caching and request-routing layer of the codxai chat client.
//! Every request the page makes is classified and answered by one of a
//! closed set of strategies backed by versioned cache namespaces.
//!
//! ## Features
//!
//! - Network-first, cache-first and stale-while-revalidate strategies
//! - Versioned static and dynamic namespaces with purge on activation
//! - Insertion-ordered eviction with an explicit index
//! - Memory and file storage providers
//! - Install / activate / skip-waiting worker lifecycle

pub mod builder;
pub mod cache;
pub mod chat;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetch;
pub mod request;
pub mod response;
pub mod strategy;
pub mod trimmer;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{FetchConfigBuilder, WorkerConfigBuilder};
pub use cache::{CacheProvider, CacheStore, FileCache, MemoryCache, NamespaceRole};
pub use classifier::{Strategy, classify};
pub use config::{FetchConfig, WorkerConfig};
pub use error::{CacheError, CacheResult, FetchError};
pub use fetch::{Fetcher, HttpFetcher, create_client};
pub use request::{Destination, RequestDescriptor, RequestKey, RequestMode};
pub use response::{Response, ResponseSource};
pub use strategy::StrategyExecutor;
pub use trimmer::CacheTrimmer;
pub use worker::{Registration, ServiceWorker, WorkerMessage, WorkerState};
