use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

/// Where a response handed back to the page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live answer from the origin
    Network,
    /// Stored copy of the requested key
    Cache,
    /// Stored copy of a different key (offline page, fallback icon)
    Fallback,
    /// Generated locally because neither network nor cache could answer
    Synthetic,
}

impl ResponseSource {
    /// Value for the `x-cache` header the proxy attaches
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ResponseSource::Network => "MISS",
            ResponseSource::Cache => "HIT",
            ResponseSource::Fallback => "FALLBACK",
            ResponseSource::Synthetic => "SYNTHETIC",
        }
    }
}

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, source: ResponseSource) -> Self {
        Self {
            status,
            headers,
            body,
            source,
        }
    }

    fn synthetic(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self::new(status, headers, body.into(), ResponseSource::Synthetic)
    }

    /// `503` JSON answer for API calls made while offline
    pub fn network_unavailable() -> Self {
        Self::synthetic(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            serde_json::json!({ "error": "Network unavailable" }).to_string(),
        )
    }

    /// `503` text answer for sub-resources that are neither cached nor reachable
    pub fn unavailable_offline() -> Self {
        Self::synthetic(
            StatusCode::SERVICE_UNAVAILABLE,
            "text/plain",
            "Resource unavailable offline",
        )
    }

    /// `408` text answer when an uncached revalidating fetch fails
    pub fn network_error() -> Self {
        Self::synthetic(StatusCode::REQUEST_TIMEOUT, "text/plain", "Network error")
    }

    /// `502` text answer for pass-through requests the origin did not answer
    pub fn bad_gateway(reason: impl std::fmt::Display) -> Self {
        Self::synthetic(
            StatusCode::BAD_GATEWAY,
            "text/plain",
            format!("Upstream unreachable: {reason}"),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Same response re-labelled with another source
    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    /// Header pairs in a serializable form; non-UTF-8 values are dropped.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect()
    }
}

/// Rebuild a header map from stored pairs, skipping anything invalid.
pub fn headers_from_pairs(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers
}
