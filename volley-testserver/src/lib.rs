use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{any, get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_API: &str = "/v1/testes";
pub const PATH_PROTECTED: &str = "/v1/protected";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_TOKEN: &str = "/oauth/token";
pub const PATH_TOKEN_WITHOUT_ACCESS_TOKEN: &str = "/oauth/token-empty";

/// Artificial latency of the token endpoint, wide enough for concurrent callers to overlap.
pub const TOKEN_LATENCY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    token_requests_total: Arc<AtomicU64>,
    saw_bearer: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
    body_bytes_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_token_requests_total(&self) -> u64 {
        self.token_requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn observe_api_request(&self, headers: &HeaderMap, body: &Bytes) {
        self.inc_requests_total();
        if bearer(headers).is_some() {
            self.saw_bearer.fetch_add(1, Ordering::Relaxed);
        }
        if headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
        {
            self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
        }
        self.body_bytes_total
            .fetch_add(body.len() as u64, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn token_requests_total(&self) -> u64 {
        self.token_requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_bearer(&self) -> u64 {
        self.saw_bearer.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }

    pub fn body_bytes_total(&self) -> u64 {
        self.body_bytes_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TestServerOptions {
    /// `expires_in` returned by the token endpoint; `None` omits the field.
    pub token_expires_in: Option<u64>,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            token_expires_in: Some(300),
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stats: TestServerStats,
    opts: TestServerOptions,
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub api: String,
    pub protected: String,
    pub slow: String,
    pub echo: String,
    pub token: String,
    pub token_without_access_token: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            api: format!("{base_url}{PATH_API}"),
            protected: format!("{base_url}{PATH_PROTECTED}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            token: format!("{base_url}{PATH_TOKEN}"),
            token_without_access_token: format!("{base_url}{PATH_TOKEN_WITHOUT_ACCESS_TOKEN}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn handle_api(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    app.stats.observe_api_request(&headers, &body);
    Json(json!({ "ok": true }))
}

async fn handle_protected(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    app.stats.observe_api_request(&headers, &body);
    match bearer(&headers) {
        Some(token) if token.starts_with("tok-") => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

async fn handle_status(
    State(app): State<AppState>,
    Path(code): Path<u16>,
) -> (StatusCode, String) {
    app.stats.inc_requests_total();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {code}"))
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn handle_slow(State(app): State<AppState>, Query(q): Query<SlowQuery>) -> &'static str {
    app.stats.inc_requests_total();
    sleep(Duration::from_millis(q.ms.unwrap_or(50))).await;
    "slow"
}

async fn handle_echo(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    app.stats.observe_api_request(&headers, &body);
    (StatusCode::OK, body)
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: String,
    client_id: String,
    client_secret: String,
}

async fn handle_token(
    State(app): State<AppState>,
    Form(form): Form<TokenForm>,
) -> (StatusCode, Json<serde_json::Value>) {
    let n = app.stats.inc_token_requests_total();
    sleep(TOKEN_LATENCY).await;

    if form.grant_type != "client_credentials"
        || form.client_id.is_empty()
        || form.client_secret.is_empty()
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_client" })),
        );
    }

    let mut body = json!({ "access_token": format!("tok-{n}"), "token_type": "bearer" });
    if let Some(expires_in) = app.opts.token_expires_in {
        body["expires_in"] = json!(expires_in);
    }
    (StatusCode::OK, Json(body))
}

async fn handle_token_without_access_token(
    State(app): State<AppState>,
) -> Json<serde_json::Value> {
    app.stats.inc_token_requests_total();
    Json(json!({ "token_type": "bearer", "expires_in": 300 }))
}

pub fn router(stats: TestServerStats, opts: TestServerOptions) -> Router {
    Router::new()
        .route(PATH_API, any(handle_api))
        .route(PATH_PROTECTED, any(handle_protected))
        .route(PATH_STATUS, any(handle_status))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_TOKEN, post(handle_token))
        .route(
            PATH_TOKEN_WITHOUT_ACCESS_TOKEN,
            post(handle_token_without_access_token),
        )
        .with_state(AppState { stats, opts })
}

pub struct TestServer {
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(opts: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), opts);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
