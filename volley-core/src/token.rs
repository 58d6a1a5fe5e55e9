use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use volley_http::{HttpClient, HttpRequest};

use crate::request_metrics::RunMetrics;

/// Tokens are treated as expired this long before the server says they are.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(5);
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

const CHECK_STATUS: &str = "token status 200";
const CHECK_ACCESS_TOKEN: &str = "token has access_token";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("token response has no `access_token`")]
    MissingAccessToken,

    #[error("token request failed: {0}")]
    Transport(#[from] volley_http::Error),
}

#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl TokenEndpoint {
    pub fn new(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    fn form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub value: Arc<str>,
    /// `None` when the server did not send `expires_in`.
    pub expires_at: Option<Instant>,
}

impl Token {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

fn expiry(fetched_at: Instant, expires_in_secs: Option<f64>) -> Option<Instant> {
    let secs = expires_in_secs.filter(|s| s.is_finite())?;
    let lifetime = Duration::from_secs_f64(secs.max(0.0));
    Some(fetched_at + lifetime.saturating_sub(EXPIRY_MARGIN))
}

/// Shared OAuth2 client-credentials token.
///
/// Reads take a short `RwLock` snapshot. Refreshes are serialized by an async mutex.
/// Every installed token bumps `generation`; a caller that finds the generation moved
/// while it waited for the mutex adopts the fresh token instead of fetching again, so
/// concurrent callers of an expired token trigger exactly one fetch even when the
/// server hands out lifetimes shorter than [`EXPIRY_MARGIN`].
#[derive(Debug)]
pub struct TokenManager {
    client: Arc<HttpClient>,
    endpoint: TokenEndpoint,
    cache: RwLock<Option<Token>>,
    refresh: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    metrics: Arc<RunMetrics>,
}

impl TokenManager {
    pub fn new(client: Arc<HttpClient>, endpoint: TokenEndpoint, metrics: Arc<RunMetrics>) -> Self {
        Self {
            client,
            endpoint,
            cache: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            metrics,
        }
    }

    fn cached_at(&self, now: Instant) -> Option<Arc<str>> {
        self.cache
            .read()
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.value.clone())
    }

    /// Caller must hold the refresh lock.
    fn install_fetched(&self, token: Token) -> Arc<str> {
        let value = token.value.clone();
        *self.cache.write() = Some(token);
        self.generation.fetch_add(1, Ordering::Release);
        value
    }

    /// Performs one token request, bypassing the cache.
    pub async fn fetch_token(&self) -> Result<Token, AuthError> {
        let result = self.fetch_token_inner().await;
        self.metrics.record_token_fetch(result.is_ok());
        if let Err(err) = &result {
            tracing::error!(url = %self.endpoint.url, error = %err, "token fetch failed");
        }
        result
    }

    async fn fetch_token_inner(&self) -> Result<Token, AuthError> {
        let req = HttpRequest::post(&self.endpoint.url, Bytes::from(self.endpoint.form_body()))
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_timeout(self.endpoint.timeout);

        let res = match self.client.request(req).await {
            Ok(res) => res,
            Err(err) => {
                self.metrics.record_check(CHECK_STATUS, false);
                self.metrics.record_check(CHECK_ACCESS_TOKEN, false);
                return Err(err.into());
            }
        };
        let fetched_at = Instant::now();

        let status_ok = res.status == 200;
        self.metrics.record_check(CHECK_STATUS, status_ok);

        let body: Option<serde_json::Value> = serde_json::from_slice(&res.body).ok();
        let access_token = body
            .as_ref()
            .and_then(|b| b.get("access_token"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        self.metrics
            .record_check(CHECK_ACCESS_TOKEN, access_token.is_some());

        if !status_ok {
            return Err(AuthError::Status {
                status: res.status,
                body: String::from_utf8_lossy(&res.body).chars().take(200).collect(),
            });
        }

        let Some(body) = body.as_ref() else {
            // Re-parse to surface the decoder's error message.
            return Err(serde_json::from_slice::<serde_json::Value>(&res.body)
                .err()
                .map_or(AuthError::MissingAccessToken, AuthError::InvalidBody));
        };
        let Some(value) = access_token else {
            return Err(AuthError::MissingAccessToken);
        };

        let expires_in = body.get("expires_in").and_then(|v| v.as_f64());
        Ok(Token {
            value: Arc::from(value),
            expires_at: expiry(fetched_at, expires_in),
        })
    }

    /// Fetches a token up front and installs it in the cache.
    pub async fn prime(&self) -> Result<Arc<str>, AuthError> {
        let _guard = self.refresh.lock().await;
        let token = self.fetch_token().await?;
        Ok(self.install_fetched(token))
    }

    /// Returns the cached token, refreshing it first when it is missing or expired.
    pub async fn valid_token(&self) -> Result<Arc<str>, AuthError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(v) = self.cached_at(Instant::now()) {
            return Ok(v);
        }

        let _guard = self.refresh.lock().await;
        if self.generation.load(Ordering::Acquire) != seen
            && let Some(token) = self.cache.read().as_ref()
        {
            return Ok(token.value.clone());
        }
        if let Some(v) = self.cached_at(Instant::now()) {
            return Ok(v);
        }

        tracing::debug!(url = %self.endpoint.url, "refreshing access token");
        let token = self.fetch_token().await?;
        Ok(self.install_fetched(token))
    }

    #[cfg(test)]
    fn cached(&self) -> Option<Token> {
        self.cache.read().clone()
    }

    #[cfg(test)]
    fn install(&self, token: Token) {
        *self.cache.write() = Some(token);
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_http::ClientOptions;
    use volley_testserver::{TestServer, TestServerOptions};

    fn manager(url: &str, metrics: Arc<RunMetrics>) -> TokenManager {
        let client = HttpClient::new(ClientOptions::default())
            .unwrap_or_else(|e| panic!("client: {e}"));
        TokenManager::new(
            Arc::new(client),
            TokenEndpoint::new(url, "volley", "secret"),
            metrics,
        )
    }

    #[test]
    fn expiry_subtracts_margin_and_saturates() {
        let now = Instant::now();
        assert_eq!(expiry(now, None), None);
        assert_eq!(expiry(now, Some(f64::NAN)), None);
        assert_eq!(expiry(now, Some(300.0)), Some(now + Duration::from_secs(295)));
        assert_eq!(expiry(now, Some(3.0)), Some(now));
        assert_eq!(expiry(now, Some(-1.0)), Some(now));
    }

    #[test]
    fn form_body_is_urlencoded() {
        let ep = TokenEndpoint::new("http://x/token", "my id", "s&cret");
        assert_eq!(
            ep.form_body(),
            "grant_type=client_credentials&client_id=my+id&client_secret=s%26cret"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_refresh() {
        let server = TestServer::start()
            .await
            .unwrap_or_else(|e| panic!("server: {e}"));
        let metrics = Arc::new(RunMetrics::new("default", 2000.0));
        let tm = Arc::new(manager(&server.urls().token, metrics.clone()));

        // Expired token in the cache.
        tm.install(Token {
            value: Arc::from("stale"),
            expires_at: Some(Instant::now()),
        });

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let tm = tm.clone();
            tasks.push(tokio::spawn(async move { tm.valid_token().await }));
        }

        let mut seen = Vec::new();
        for t in tasks {
            let token = t
                .await
                .unwrap_or_else(|e| panic!("join: {e}"))
                .unwrap_or_else(|e| panic!("token: {e}"));
            seen.push(token);
        }

        assert_eq!(server.stats().token_requests_total(), 1);
        assert!(seen.iter().all(|t| t.as_ref() == "tok-1"), "{seen:?}");
        assert_eq!(metrics.token_fetches_total(), 1);

        // Still valid: no further fetch.
        let again = tm.valid_token().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(again.as_ref(), "tok-1");
        assert_eq!(server.stats().token_requests_total(), 1);

        server.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn short_lived_token_is_still_fetched_once_for_concurrent_callers() {
        // 3s is inside the expiry margin, so the fetched token is already stale.
        let server = TestServer::start_with(TestServerOptions {
            token_expires_in: Some(3),
        })
        .await
        .unwrap_or_else(|e| panic!("server: {e}"));
        let metrics = Arc::new(RunMetrics::new("default", 2000.0));
        let tm = Arc::new(manager(&server.urls().token, metrics.clone()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let tm = tm.clone();
            tasks.push(tokio::spawn(async move { tm.valid_token().await }));
        }

        let mut seen = Vec::new();
        for t in tasks {
            let token = t
                .await
                .unwrap_or_else(|e| panic!("join: {e}"))
                .unwrap_or_else(|e| panic!("token: {e}"));
            seen.push(token);
        }

        assert_eq!(server.stats().token_requests_total(), 1);
        assert_eq!(metrics.token_fetches_total(), 1);
        assert_eq!(tm.generation(), 1);
        assert!(seen.iter().all(|t| t.as_ref() == "tok-1"), "{seen:?}");

        // A later caller that did not wait on that refresh fetches again.
        let next = tm.valid_token().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(next.as_ref(), "tok-2");
        assert_eq!(server.stats().token_requests_total(), 2);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn token_without_expiry_never_refreshes() {
        let server = TestServer::start_with(TestServerOptions {
            token_expires_in: None,
        })
        .await
        .unwrap_or_else(|e| panic!("server: {e}"));
        let tm = manager(
            &server.urls().token,
            Arc::new(RunMetrics::new("default", 2000.0)),
        );

        tm.prime().await.unwrap_or_else(|e| panic!("{e}"));
        assert!(tm.cached().is_some_and(|t| t.expires_at.is_none()));
        tm.valid_token().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(server.stats().token_requests_total(), 1);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn non_200_status_is_an_auth_error() {
        let server = TestServer::start()
            .await
            .unwrap_or_else(|e| panic!("server: {e}"));
        let metrics = Arc::new(RunMetrics::new("default", 2000.0));
        let tm = manager(&server.urls().status(401), metrics.clone());

        match tm.fetch_token().await {
            Err(AuthError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(metrics.token_fetches_total(), 1);
        assert!(tm.cached().is_none());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn missing_access_token_is_an_auth_error() {
        let server = TestServer::start()
            .await
            .unwrap_or_else(|e| panic!("server: {e}"));
        let tm = manager(
            &server.urls().token_without_access_token,
            Arc::new(RunMetrics::new("default", 2000.0)),
        );

        let err = tm.valid_token().await.err();
        assert!(matches!(err, Some(AuthError::MissingAccessToken)), "{err:?}");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn non_json_body_is_an_auth_error() {
        let server = TestServer::start()
            .await
            .unwrap_or_else(|e| panic!("server: {e}"));
        // The echo endpoint answers 200 with the form body, which is not JSON.
        let tm = manager(
            &server.urls().echo,
            Arc::new(RunMetrics::new("default", 2000.0)),
        );
        let err = tm.fetch_token().await.err();
        assert!(matches!(err, Some(AuthError::InvalidBody(_))), "{err:?}");

        server.shutdown().await;
    }
}
