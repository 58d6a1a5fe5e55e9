use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;

use crate::connect::Dialer;
use crate::pool::{Origin, Pool, PooledConn};
use crate::timings::Timings;
use crate::util::{has_header, host_header_value, merge_headers, request_target, wants_close};
use crate::{Error, HttpRequest, HttpResponse, Result, tls};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// TCP connect timeout per resolved address.
    pub connect_timeout: Option<Duration>,
    /// Accept any server certificate (self-signed, wrong host, expired).
    pub insecure_skip_tls_verify: bool,
    pub max_idle_per_host: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            // The OS-level TCP connect timeout can be tens of seconds; surface unreachable
            // targets promptly instead.
            connect_timeout: Some(Duration::from_secs(3)),
            insecure_skip_tls_verify: false,
            max_idle_per_host: 1024,
        }
    }
}

/// HTTP/1.1 client that records a phase breakdown for every exchange.
///
/// Cloning is cheap; clones share the idle connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    dialer: Dialer,
    pool: Arc<Pool>,
}

impl HttpClient {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let tls = tls::client_config(opts.insecure_skip_tls_verify)?;
        Ok(Self {
            dialer: Dialer::new(opts.connect_timeout, tls),
            pool: Arc::new(Pool::new(opts.max_idle_per_host)),
        })
    }

    /// Runs one exchange. `req.timeout`, when set, bounds the whole exchange including
    /// connection setup and body read.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        match req.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(req))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.exchange(req).await,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    /// Number of keep-alive connections currently parked in the pool.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        let origin = Origin::from_url(&parsed)?;
        let request = build_request(req, &parsed)?;

        let started = Instant::now();
        let mut timings = Timings::default();
        let (mut conn, reused) = self.acquire(&origin, &mut timings).await?;

        conn.marks.reset();
        let send_start = Instant::now();
        timings.blocked = send_start
            .saturating_duration_since(started)
            .saturating_sub(timings.dns + timings.connect + timings.tls);

        let res = conn
            .sender
            .send_request(request)
            .await
            .map_err(Error::Request)?;
        let (parts, body) = res.into_parts();
        let body = body.collect().await.map_err(Error::BodyRead)?.to_bytes();
        let body_end = Instant::now();

        let io = conn.marks.snapshot();
        timings.set_exchange(send_start, io, body_end);

        if !wants_close(&parts.headers) {
            self.pool.checkin(origin, conn);
        }

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers: merge_headers(&parts.headers),
            bytes_sent: io.written,
            bytes_received: io.read,
            timings,
            reused_connection: reused,
        })
    }

    /// Takes a ready pooled connection or dials a new one, filling the setup phases.
    async fn acquire(&self, origin: &Origin, timings: &mut Timings) -> Result<(PooledConn, bool)> {
        while let Some(mut conn) = self.pool.checkout(origin) {
            if conn.sender.ready().await.is_ok() {
                return Ok((conn, true));
            }
        }

        let mut dialed = self.dialer.dial(origin).await?;
        timings.dns = dialed.dns;
        timings.connect = dialed.connect;
        timings.tls = dialed.tls;

        let setup = dialed.setup_time();
        let waited = Instant::now();
        dialed.conn.sender.ready().await.map_err(Error::Handshake)?;
        tracing::trace!(
            host = %origin.host,
            port = origin.port,
            ?setup,
            ready_after = ?waited.elapsed(),
            "dialed new connection"
        );
        Ok((dialed.conn, false))
    }
}

fn build_request(req: HttpRequest, parsed: &url::Url) -> Result<Request<Full<Bytes>>> {
    let mut builder = Request::builder()
        .method(req.method)
        .uri(request_target(parsed));

    // hyper's connection API writes exactly what it is given; Host must be explicit.
    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        builder = builder.header(http::header::HOST, host);
    }
    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
    }

    for (k, v) in req.headers {
        let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
        let value = http::header::HeaderValue::from_str(&v)?;
        builder = builder.header(name, value);
    }

    Ok(builder.body(Full::new(req.body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(ClientOptions {
            connect_timeout: Some(Duration::from_millis(200)),
            ..ClientOptions::default()
        })
        .unwrap_or_else(|e| panic!("client: {e}"));

        let started = Instant::now();
        let err = client.request(HttpRequest::get("http://192.0.2.1:81/")).await;
        let elapsed = started.elapsed();

        assert!(err.is_err());
        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn rejects_non_http_schemes_before_dialing() {
        let client =
            HttpClient::new(ClientOptions::default()).unwrap_or_else(|e| panic!("client: {e}"));
        let err = client.get("ftp://example.com/file").await.err();
        assert!(matches!(err, Some(Error::UnsupportedScheme(_))));
        let err = client.get("not a url").await.err();
        assert!(matches!(err, Some(Error::InvalidUrl(_))));
    }

    #[test]
    fn build_request_uses_origin_form_and_explicit_host() {
        let parsed = url::Url::parse("http://127.0.0.1:8080/v1/testes?x=1")
            .unwrap_or_else(|e| panic!("url: {e}"));
        let req = HttpRequest::post(parsed.as_str(), Bytes::from_static(b"{}"))
            .with_header("Content-Type", "application/json");
        let built = build_request(req, &parsed).unwrap_or_else(|e| panic!("build: {e}"));

        assert_eq!(built.uri(), "/v1/testes?x=1");
        assert_eq!(
            built.headers().get(http::header::HOST).map(|v| v.as_bytes()),
            Some(&b"127.0.0.1:8080"[..])
        );
        assert_eq!(
            built
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .map(|v| v.as_bytes()),
            Some(&b"2"[..])
        );
    }
}
