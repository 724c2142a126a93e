//! HTTP surface of the proxy using Axum.
//!
//! Control routes live under `/__worker/`; every other request is turned
//! into a [`RequestDescriptor`] and answered by the registration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use offline_cache::fetch::strip_hop_by_hop;
use offline_cache::{
    NamespaceRole, Registration, RequestDescriptor, Response, ServiceWorker, WorkerMessage,
    WorkerState,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AppError;

/// Largest request body the proxy buffers
const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Tells the page whether the answer came from the network or the cache
const X_CACHE: &str = "x-cache";

/// Application state shared across handlers.
pub struct AppState {
    pub registration: Arc<Registration>,
    /// Upstream origin intercepted paths are resolved against
    pub upstream: Url,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/__worker/status", get(handle_status))
        .route("/__worker/message", post(handle_message))
        .route("/__worker/sync", post(handle_sync))
        .fallback(handle_intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then wait for background refreshes.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registration = Arc::clone(&state.registration);
    info!("Proxy listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    registration.settle().await;
    info!("Pending cache refreshes settled");
    Ok(())
}

/// Emit the maintenance tag on a fixed interval until cancelled.
pub fn spawn_maintenance(
    registration: Arc<Registration>,
    tag: String,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match registration.handle_periodic_sync(&tag).await {
                        Ok(evicted) => debug!(evicted, "Periodic maintenance done"),
                        Err(e) => warn!(error = %e, "Periodic maintenance failed"),
                    }
                }
            }
        }
    })
}

async fn handle_intercept(State(state): State<Arc<AppState>>, request: Request) -> HttpResponse {
    let (parts, body) = request.into_parts();

    let url = upstream_url(&state.upstream, &parts.uri);

    let body = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let body = (!body.is_empty()).then_some(body);

    let descriptor = RequestDescriptor::from_parts(parts.method, url, parts.headers, body);
    let response = state.registration.handle_fetch(&descriptor).await;
    into_http(response)
}

/// Rebase the request target onto the upstream origin. Scheme, host and
/// port always come from `upstream`, so a `//host/path` target stays a path.
fn upstream_url(upstream: &Url, uri: &Uri) -> Url {
    let mut url = upstream.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url
}

fn into_http(response: Response) -> HttpResponse {
    let mut headers = response.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);
    headers.insert(
        HeaderName::from_static(X_CACHE),
        HeaderValue::from_static(response.source.as_header_value()),
    );

    let mut http = HttpResponse::new(Body::from(response.body));
    *http.status_mut() = response.status;
    *http.headers_mut() = headers;
    http
}

#[derive(Debug, Serialize)]
struct NamespaceReport {
    name: String,
    entries: usize,
}

#[derive(Debug, Serialize)]
struct WorkerReport {
    id: u64,
    version: String,
    state: WorkerState,
    static_namespace: NamespaceReport,
    dynamic_namespace: NamespaceReport,
}

impl WorkerReport {
    async fn collect(worker: &ServiceWorker) -> Result<Self, AppError> {
        let store = worker.store();
        Ok(Self {
            id: worker.id(),
            version: worker.config().version.clone(),
            state: worker.state(),
            static_namespace: NamespaceReport {
                name: store.static_name(),
                entries: store.entry_count(NamespaceRole::Static).await?,
            },
            dynamic_namespace: NamespaceReport {
                name: store.dynamic_name(),
                entries: store.entry_count(NamespaceRole::Dynamic).await?,
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    active: Option<WorkerReport>,
    waiting: Option<WorkerReport>,
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusReport>, AppError> {
    let active = match state.registration.active() {
        Some(worker) => Some(WorkerReport::collect(&worker).await?),
        None => None,
    };
    let waiting = match state.registration.waiting() {
        Some(worker) => Some(WorkerReport::collect(&worker).await?),
        None => None,
    };
    Ok(Json(StatusReport { active, waiting }))
}

#[derive(Debug, Serialize)]
struct MessageReply {
    promoted: bool,
}

async fn handle_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<WorkerMessage>,
) -> Result<Json<MessageReply>, AppError> {
    let promoted = state.registration.handle_message(&message).await?;
    Ok(Json(MessageReply { promoted }))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    tag: String,
}

#[derive(Debug, Serialize)]
struct SyncReply {
    evicted: usize,
}

async fn handle_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReply>, AppError> {
    let evicted = state.registration.handle_periodic_sync(&request.tag).await?;
    Ok(Json(SyncReply { evicted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::Method;
    use offline_cache::{
        CacheProvider, FetchConfig, FileCache, HttpFetcher, MemoryCache, WorkerConfig, create_client,
    };
    use serde_json::{Value, json};
    use tokio::sync::oneshot;

    struct Upstream {
        url: Url,
        logo_hits: Arc<AtomicUsize>,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    }

    async fn spawn_upstream() -> Upstream {
        let logo_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&logo_hits);

        let app = Router::new()
            .route("/", get(|| async { ([("content-type", "text/html")], "<html>shell</html>") }))
            .route("/manifest.json", get(|| async { Json(json!({ "name": "codxai" })) }))
            .route("/offline.html", get(|| async { "<h1>You are offline</h1>" }))
            .route("/logo-192.png", get(|| async { "icon" }))
            .route(
                "/logo.png",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        ([("content-type", "image/png")], "png-bytes")
                    }
                }),
            )
            .route(
                "/api/chat",
                post(|body: String| async move { Json(json!({ "text": body })) })
                    .get(|| async { (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "slow down" }))) }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    stopped.await.ok();
                })
                .await
                .unwrap();
        });

        Upstream {
            url: Url::parse(&format!("http://{addr}/")).unwrap(),
            logo_hits,
            stop,
            handle,
        }
    }

    async fn spawn_proxy(registration: Arc<Registration>, upstream: &Url) -> Url {
        let state = Arc::new(AppState {
            registration,
            upstream: upstream.clone(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    fn worker_config(upstream: &Url) -> WorkerConfig {
        WorkerConfig::builder()
            .with_origin(upstream.clone())
            .with_family("app")
            .with_version("v1")
            .with_static_assets(["/", "/manifest.json", "/offline.html", "/logo-192.png"])
            .build()
    }

    async fn registered(upstream: &Url) -> Arc<Registration> {
        let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap());
        let registration = Arc::new(Registration::new(Arc::new(MemoryCache::new()), fetcher));
        registration.register(worker_config(upstream)).await.unwrap();
        registration
    }

    fn client() -> reqwest::Client {
        create_client(&FetchConfig::default()).unwrap()
    }

    fn x_cache(response: &reqwest::Response) -> &str {
        response.headers()[X_CACHE].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_active_worker() {
        let upstream = spawn_upstream().await;
        let proxy = spawn_proxy(registered(&upstream.url).await, &upstream.url).await;

        let status: Value = client()
            .get(proxy.join("/__worker/status").unwrap())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(status["active"]["state"], "activated");
        assert_eq!(status["active"]["static_namespace"]["name"], "app-v1-static");
        assert_eq!(status["active"]["static_namespace"]["entries"], 4);
        assert_eq!(status["waiting"], Value::Null);
    }

    #[tokio::test]
    async fn test_images_are_served_cache_first() {
        let upstream = spawn_upstream().await;
        let proxy = spawn_proxy(registered(&upstream.url).await, &upstream.url).await;
        let client = client();
        let logo = proxy.join("/logo.png").unwrap();

        let first = client.get(logo.clone()).header("sec-fetch-dest", "image").send().await.unwrap();
        assert_eq!(x_cache(&first), "MISS");
        assert_eq!(first.text().await.unwrap(), "png-bytes");

        let second = client.get(logo).header("sec-fetch-dest", "image").send().await.unwrap();
        assert_eq!(x_cache(&second), "HIT");
        assert_eq!(second.headers()["content-type"], "image/png");
        assert_eq!(second.text().await.unwrap(), "png-bytes");

        assert_eq!(upstream.logo_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_requests_pass_through_uncached() {
        let upstream = spawn_upstream().await;
        let registration = registered(&upstream.url).await;
        let proxy = spawn_proxy(Arc::clone(&registration), &upstream.url).await;
        let client = client();
        let chat = proxy.join("/api/chat").unwrap();

        let reply: Value = client
            .request(Method::POST, chat.clone())
            .body(r#"{"messages":[]}"#)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["text"], r#"{"messages":[]}"#);

        let limited = client.get(chat).send().await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let store = registration.active().unwrap().store().clone();
        assert_eq!(store.entry_count(NamespaceRole::Dynamic).await.unwrap(), 0);
        assert_eq!(store.entry_count(NamespaceRole::Static).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_offline_navigation_and_api() {
        let upstream = spawn_upstream().await;
        let proxy = spawn_proxy(registered(&upstream.url).await, &upstream.url).await;

        upstream.stop.send(()).unwrap();
        upstream.handle.await.unwrap();

        let client = client();
        let page = client
            .get(proxy.join("/chat/1").unwrap())
            .header("accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .unwrap();
        assert_eq!(x_cache(&page), "FALLBACK");
        assert_eq!(page.text().await.unwrap(), "<h1>You are offline</h1>");

        let api = client.get(proxy.join("/api/history").unwrap()).send().await.unwrap();
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = api.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Network unavailable" }));
    }

    #[test]
    fn test_upstream_url_keeps_upstream_origin() {
        let upstream = Url::parse("http://localhost:3000/").unwrap();

        let url = upstream_url(&upstream, &Uri::from_static("/chat/1?draft=true"));
        assert_eq!(url.as_str(), "http://localhost:3000/chat/1?draft=true");

        let url = upstream_url(&upstream, &Uri::from_static("//169.254.169.254/latest/meta-data"));
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(3000));
        assert_eq!(url.path(), "//169.254.169.254/latest/meta-data");
    }

    #[tokio::test]
    async fn test_scheme_relative_target_stays_on_upstream() {
        let upstream = spawn_upstream().await;
        let other = spawn_upstream().await;
        let registration = registered(&upstream.url).await;
        let proxy = spawn_proxy(Arc::clone(&registration), &upstream.url).await;

        let other_host = other.url.authority().to_owned();
        let target = Url::parse(&format!("{proxy}/{other_host}/logo.png")).unwrap();
        assert!(target.path().starts_with("//"));

        let response = client()
            .get(target)
            .header("sec-fetch-dest", "image")
            .send()
            .await
            .unwrap();
        assert_ne!(response.text().await.unwrap(), "png-bytes");
        assert_eq!(other.logo_hits.load(Ordering::SeqCst), 0);

        registration.settle().await;
        let store = registration.active().unwrap().store().clone();
        let foreign = RequestDescriptor::get(other.url.join("/logo.png").unwrap()).key();
        assert!(store.match_any(&foreign).await.is_none());
    }

    #[tokio::test]
    async fn test_control_routes() {
        let upstream = spawn_upstream().await;
        let proxy = spawn_proxy(registered(&upstream.url).await, &upstream.url).await;
        let client = client();

        let reply: Value = client
            .post(proxy.join("/__worker/message").unwrap())
            .json(&json!({ "type": "SKIP_WAITING" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply, json!({ "promoted": false }));

        let reply: Value = client
            .post(proxy.join("/__worker/sync").unwrap())
            .json(&json!({ "tag": "cache-cleanup" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply, json!({ "evicted": 0 }));
    }

    #[tokio::test]
    async fn test_file_cache_survives_restart() {
        let upstream = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap());

        let registration = Registration::new(Arc::new(FileCache::new(dir.path())), fetcher);
        registration.register(worker_config(&upstream.url)).await.unwrap();

        upstream.stop.send(()).unwrap();
        upstream.handle.await.unwrap();

        // A fresh provider over the same directory sees the installed shell.
        let reopened = FileCache::new(dir.path());
        let key = RequestDescriptor::get(upstream.url.join("/manifest.json").unwrap()).key();
        let entry = reopened.get("app-v1-static", &key).await.unwrap().unwrap();
        assert_eq!(entry.body, bytes::Bytes::from_static(br#"{"name":"codxai"}"#));
        assert_eq!(reopened.len("app-v1-static").await.unwrap(), 4);
    }
}
