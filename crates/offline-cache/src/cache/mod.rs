//! # Cache System
//!
//! Versioned response namespaces, the storage providers behind them and the
//! store that owns their lifecycle.

// Module declarations
pub(crate) mod index;
pub mod providers;
mod store;
mod types;

pub use store::CacheStore;
pub use types::{CacheEntry, CacheLookupResult, CacheMetadata, NamespaceRole};

pub use providers::{CacheProvider, FileCache, MemoryCache};
