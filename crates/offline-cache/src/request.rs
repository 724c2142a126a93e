//! # Intercepted requests
//!
//! A [`RequestDescriptor`] is everything the classifier and the strategies
//! know about one intercepted fetch. Browsers describe the purpose of a
//! request through the `Sec-Fetch-Dest` and `Sec-Fetch-Mode` headers; when a
//! client omits them the descriptor infers them from the path and `Accept`.

use std::fmt;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";
pub const SEC_FETCH_MODE: &str = "sec-fetch-mode";

/// Resource type the page is requesting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    /// `fetch()`/XHR and anything else without a specific type
    Empty,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value. Unknown values map to `Empty`.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" | "worker" | "sharedworker" | "serviceworker" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            _ => Destination::Empty,
        }
    }

    /// Guess the destination from a path's file extension.
    pub fn from_path(path: &str) -> Self {
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp") => {
                Destination::Image
            }
            Some("js" | "mjs") => Destination::Script,
            Some("css") => Destination::Style,
            Some("woff" | "woff2" | "ttf" | "otf") => Destination::Font,
            Some("webmanifest") => Destination::Manifest,
            _ => Destination::Empty,
        }
    }
}

/// How the page issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMode {
    /// Top-level document load
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` value. Unknown values map to `Cors`.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => RequestMode::Navigate,
            "same-origin" => RequestMode::SameOrigin,
            "no-cors" => RequestMode::NoCors,
            _ => RequestMode::Cors,
        }
    }
}

/// Identity of a stored response: method plus absolute URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.as_str().to_owned(),
            url: url.as_str().to_owned(),
        }
    }

    /// Key of a `GET` for `url`, the only kind ever stored.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    /// Filename-safe digest of the key
    pub fn to_filename(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// One intercepted fetch
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    /// A plain `GET` sub-resource request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Build a descriptor from what arrived on the wire, reading the
    /// `Sec-Fetch-*` headers and falling back to inference when absent.
    pub fn from_parts(method: Method, url: Url, headers: HeaderMap, body: Option<Bytes>) -> Self {
        let destination = header_str(&headers, SEC_FETCH_DEST)
            .map(Destination::from_header)
            .unwrap_or_else(|| Destination::from_path(url.path()));

        let mode = match header_str(&headers, SEC_FETCH_MODE) {
            Some(value) => RequestMode::from_header(value),
            None if method == Method::GET && accepts_html(&headers) => RequestMode::Navigate,
            None => RequestMode::Cors,
        };

        Self {
            method,
            url,
            destination,
            mode,
            headers,
            body,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// Browsers list text/html first for document loads; fetch() sends */*.
fn accepts_html(headers: &HeaderMap) -> bool {
    header_str(headers, ACCEPT.as_str())
        .map(|accept| accept.trim_start().starts_with("text/html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:3000").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_sec_fetch_headers_take_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("image"));
        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("no-cors"));

        let request = RequestDescriptor::from_parts(Method::GET, url("/avatar"), headers, None);
        assert_eq!(request.destination, Destination::Image);
        assert_eq!(request.mode, RequestMode::NoCors);
    }

    #[test]
    fn test_inference_without_sec_fetch_headers() {
        let request =
            RequestDescriptor::from_parts(Method::GET, url("/_next/app.js"), HeaderMap::new(), None);
        assert_eq!(request.destination, Destination::Script);
        assert_eq!(request.mode, RequestMode::Cors);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        let request = RequestDescriptor::from_parts(Method::GET, url("/"), headers, None);
        assert_eq!(request.mode, RequestMode::Navigate);
        assert_eq!(request.destination, Destination::Empty);
    }

    #[test]
    fn test_post_with_html_accept_is_not_navigation() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        let request = RequestDescriptor::from_parts(Method::POST, url("/"), headers, None);
        assert_eq!(request.mode, RequestMode::Cors);
    }

    #[test]
    fn test_destination_from_path() {
        assert_eq!(Destination::from_path("/logo-192.png"), Destination::Image);
        assert_eq!(Destination::from_path("/favicon.ICO"), Destination::Image);
        assert_eq!(Destination::from_path("/_next/static/css/app.css"), Destination::Style);
        assert_eq!(Destination::from_path("/v1.2/data"), Destination::Empty);
        assert_eq!(Destination::from_path("/manifest.json"), Destination::Empty);
    }

    #[test]
    fn test_key_includes_query_and_method() {
        let a = RequestKey::get(&url("/feed?page=1"));
        let b = RequestKey::get(&url("/feed?page=2"));
        assert_ne!(a, b);
        assert_ne!(a.to_filename(), b.to_filename());
        assert_eq!(a.to_string(), "GET http://localhost:3000/feed?page=1");
        assert_eq!(a.to_filename().len(), 64);
    }
}
