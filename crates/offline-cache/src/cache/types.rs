//! # Cache Types
//!
//! Types shared by the store manager and the storage providers.

use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::request::RequestKey;
use crate::response::{Response, ResponseSource, headers_from_pairs};

/// Role of a namespace within one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceRole {
    /// Populated once at install, plus cache-first misses
    Static,
    /// Filled by stale-while-revalidate, bounded by the trimmer
    Dynamic,
}

impl NamespaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceRole::Static => "static",
            NamespaceRole::Dynamic => "dynamic",
        }
    }
}

/// Metadata for a stored response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the response was stored (unix seconds)
    pub cached_at: u64,
    /// Position in the namespace's insertion order, assigned on write
    pub sequence: u64,
    /// Body size in bytes
    pub size: u64,
    /// Content type of the response
    pub content_type: Option<String>,
}

impl CacheMetadata {
    pub fn new(size: u64) -> Self {
        Self {
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            sequence: 0,
            size,
            content_type: None,
        }
    }

    pub fn with_content_type_option(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }
}

/// A captured response bound to its request key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub metadata: CacheMetadata,
    #[serde(skip)]
    pub body: Bytes,
}

impl CacheEntry {
    /// Capture a response for storage. The body is shared, not copied.
    pub fn from_response(key: RequestKey, response: &Response) -> Self {
        let metadata = CacheMetadata::new(response.body.len() as u64)
            .with_content_type_option(response.content_type().map(str::to_owned));

        Self {
            key,
            status: response.status.as_u16(),
            headers: response.header_pairs(),
            metadata,
            body: response.body.clone(),
        }
    }

    pub fn to_response(&self, source: ResponseSource) -> CacheResult<Response> {
        let status = StatusCode::from_u16(self.status).map_err(|e| {
            crate::error::CacheError::CorruptEntry {
                path: self.key.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Response::new(
            status,
            headers_from_pairs(&self.headers),
            self.body.clone(),
            source,
        ))
    }
}

/// A type representing the result of a cache lookup operation
pub type CacheLookupResult = CacheResult<Option<CacheEntry>>;
