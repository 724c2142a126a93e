//! Shared fixtures for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::config::WorkerConfig;
use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::request::RequestDescriptor;
use crate::response::{Response, ResponseSource};

#[inline]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Fetcher answering from a fixed routing table and recording every call.
/// Unrouted URLs fail as if the network were down.
#[derive(Default)]
pub(crate) struct StubFetcher {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<RequestDescriptor>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, config: &WorkerConfig, path: &str, response: Response) {
        let url = config.resolve(path).unwrap();
        self.routes.lock().insert(url.to_string(), response);
    }

    pub fn respond_status(&self, config: &WorkerConfig, path: &str, status: StatusCode) {
        let mut response = ok_text("error");
        response.status = status;
        self.respond(config, path, response);
    }

    /// Take `path` offline.
    pub fn fail(&self, config: &WorkerConfig, path: &str) {
        let url = config.resolve(path).unwrap();
        self.routes.lock().remove(url.as_str());
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<RequestDescriptor> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response, FetchError> {
        self.calls.lock().push(request.clone());
        self.routes
            .lock()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Connect(format!("no route to {}", request.url)))
    }
}

/// `200 text/plain` network response.
pub(crate) fn ok_text(body: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    Response::new(
        StatusCode::OK,
        headers,
        Bytes::from_static(body.as_bytes()),
        ResponseSource::Network,
    )
}

/// Config in the `app` family with the given version and install list.
pub(crate) fn worker_config<'a>(
    version: &str,
    assets: impl IntoIterator<Item = &'a str>,
) -> WorkerConfig {
    WorkerConfig::builder()
        .with_family("app")
        .with_version(version)
        .with_static_assets(assets)
        .build()
}
