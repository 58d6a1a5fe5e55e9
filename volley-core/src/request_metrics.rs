use std::sync::Arc;
use std::time::Duration;

use volley_http::HttpResponse;
use volley_metrics::{MetricHandle, MetricId, MetricKind, Registry, sanitize};

/// Metric names; these are part of the summary contract.
pub mod names {
    pub const TOTAL_DURATION: &str = "total_duration";
    pub const WAITING_TTFB: &str = "waiting_ttfb";
    pub const BLOCKED: &str = "blocked";
    pub const DNS: &str = "dns";
    pub const TCP: &str = "tcp";
    pub const TLS: &str = "tls";
    pub const RECEIVING: &str = "receiving";
    pub const SENDING: &str = "sending";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";

    pub const REQ_FAIL_RATE: &str = "req_fail_rate";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const CHECKS: &str = "checks";

    pub const REQ_SLOW_OVER_THRESHOLD: &str = "req_slow_over_threshold";
    pub const HTTP_REQS: &str = "http_reqs";
    pub const DATA_SENT: &str = "data_sent";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const REQUEST_ERRORS: &str = "request_errors";

    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
    pub const INCOMPLETE_ITERATIONS: &str = "incomplete_iterations";

    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";

    pub const TOKEN_FETCHES: &str = "token_fetches";
    pub const TOKEN_FETCH_FAILURES: &str = "token_fetch_failures";
}

pub const TAG_SCENARIO: &str = "scenario";
pub const TAG_ERROR_KIND: &str = "error_kind";
pub const TAG_CHECK: &str = "check";
pub const TAG_STATUS: &str = "status";

/// `error_kind` for responses whose status was not acceptable.
pub const ERROR_KIND_STATUS: &str = "unexpected_status";
/// `error_kind` for requests that never left because no token could be obtained.
pub const ERROR_KIND_AUTH: &str = "auth";

const BODY_PREFIX_CHARS: usize = 200;

/// One completed request, flattened for recording. All timings in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOutcome {
    pub duration_ms: f64,
    pub wait_ms: f64,
    pub dns_ms: f64,
    pub connect_ms: f64,
    pub tls_ms: f64,
    pub send_ms: f64,
    pub receive_ms: f64,
    pub blocked_ms: f64,
    /// `None` when the request failed below HTTP.
    pub status: Option<u16>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Status was in the acceptable set.
    pub success: bool,
    /// Transport failure class, if any.
    pub error_kind: Option<String>,
    /// First 200 characters of the body, kept only for failed requests.
    pub body_prefix: String,
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl RequestOutcome {
    pub fn from_response(res: &HttpResponse, acceptable: &[u16]) -> Self {
        let success = acceptable.contains(&res.status);
        let t = &res.timings;

        Self {
            duration_ms: ms(t.duration),
            wait_ms: ms(t.waiting),
            dns_ms: ms(t.dns),
            connect_ms: ms(t.connect),
            tls_ms: ms(t.tls),
            send_ms: ms(t.sending),
            receive_ms: ms(t.receiving),
            blocked_ms: ms(t.blocked),
            status: Some(res.status),
            bytes_sent: res.bytes_sent,
            bytes_received: res.bytes_received,
            success,
            error_kind: None,
            body_prefix: if success {
                String::new()
            } else {
                String::from_utf8_lossy(&res.body)
                    .chars()
                    .take(BODY_PREFIX_CHARS)
                    .collect()
            },
        }
    }

    /// A request that produced no response. Only the elapsed wall time is known.
    pub fn from_transport_error(err: &volley_http::Error, elapsed: Duration) -> Self {
        Self {
            duration_ms: ms(elapsed),
            error_kind: Some(err.transport_error_kind().to_string()),
            body_prefix: err.to_string().chars().take(BODY_PREFIX_CHARS).collect(),
            ..Self::default()
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Per-run metric recorder.
///
/// All handles are resolved once with the `scenario` tag, so hot-path recording only
/// touches atomics and per-series histogram locks. Series that carry a per-call tag
/// (`error_kind`, `check`) are resolved on first use.
#[derive(Debug)]
pub struct RunMetrics {
    registry: Arc<Registry>,
    scenario: String,
    slow_threshold_ms: f64,

    request_errors: MetricId,
    checks: MetricId,

    total_duration: MetricHandle,
    waiting_ttfb: MetricHandle,
    blocked: MetricHandle,
    dns: MetricHandle,
    tcp: MetricHandle,
    tls: MetricHandle,
    receiving: MetricHandle,
    sending: MetricHandle,
    http_req_duration: MetricHandle,

    req_fail_rate: MetricHandle,
    http_req_failed: MetricHandle,

    req_slow: MetricHandle,
    http_reqs: MetricHandle,
    data_sent: MetricHandle,
    data_received: MetricHandle,

    iterations_success: MetricHandle,
    iterations_failure: MetricHandle,
    iteration_duration: MetricHandle,
    dropped_iterations: MetricHandle,
    incomplete_iterations: MetricHandle,

    vus: MetricHandle,
    vus_max: MetricHandle,

    token_fetches: MetricHandle,
    token_fetch_failures: MetricHandle,
}

impl RunMetrics {
    pub fn new(scenario: &str, slow_threshold_ms: f64) -> Self {
        Self::with_registry(Arc::new(Registry::default()), scenario, slow_threshold_ms)
    }

    pub fn with_registry(registry: Arc<Registry>, scenario: &str, slow_threshold_ms: f64) -> Self {
        use MetricKind::{Counter, Gauge, Rate, Trend};
        use names::*;

        let base = registry.resolve_tags(&[(TAG_SCENARIO, scenario)]);
        let reg = registry.as_ref();
        let h = |name: &str, kind: MetricKind| reg.series(name, kind, &base);
        let iteration_handle = |status: &str| {
            let tags = reg.resolve_tags(&[(TAG_SCENARIO, scenario), (TAG_STATUS, status)]);
            reg.series(ITERATIONS, Counter, &tags)
        };

        Self {
            scenario: scenario.to_string(),
            slow_threshold_ms: sanitize(&slow_threshold_ms),

            request_errors: reg.register(REQUEST_ERRORS, Counter),
            checks: reg.register(CHECKS, Rate),

            total_duration: h(TOTAL_DURATION, Trend),
            waiting_ttfb: h(WAITING_TTFB, Trend),
            blocked: h(BLOCKED, Trend),
            dns: h(DNS, Trend),
            tcp: h(TCP, Trend),
            tls: h(TLS, Trend),
            receiving: h(RECEIVING, Trend),
            sending: h(SENDING, Trend),
            http_req_duration: h(HTTP_REQ_DURATION, Trend),

            req_fail_rate: h(REQ_FAIL_RATE, Rate),
            http_req_failed: h(HTTP_REQ_FAILED, Rate),

            req_slow: h(REQ_SLOW_OVER_THRESHOLD, Counter),
            http_reqs: h(HTTP_REQS, Counter),
            data_sent: h(DATA_SENT, Counter),
            data_received: h(DATA_RECEIVED, Counter),

            iterations_success: iteration_handle("success"),
            iterations_failure: iteration_handle("failure"),
            iteration_duration: h(ITERATION_DURATION, Trend),
            dropped_iterations: h(DROPPED_ITERATIONS, Counter),
            incomplete_iterations: h(INCOMPLETE_ITERATIONS, Counter),

            vus: h(VUS, Gauge),
            vus_max: h(VUS_MAX, Gauge),

            token_fetches: h(TOKEN_FETCHES, Counter),
            token_fetch_failures: h(TOKEN_FETCH_FAILURES, Counter),

            registry,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn tagged(&self, metric: MetricId, key: &str, value: &str) -> Option<MetricHandle> {
        let tags = self
            .registry
            .resolve_tags(&[(TAG_SCENARIO, self.scenario.as_str()), (key, value)]);
        self.registry.handle(metric, &tags)
    }

    fn request_error(&self, kind: &str) {
        if let Some(h) = self.tagged(self.request_errors, TAG_ERROR_KIND, kind) {
            h.add(1);
        }
    }

    pub fn record_request(&self, o: &RequestOutcome) {
        self.http_reqs.add(1);
        self.data_sent.add(o.bytes_sent);
        self.data_received.add(o.bytes_received);

        self.total_duration.observe(&o.duration_ms);
        self.http_req_duration.observe(&o.duration_ms);
        self.waiting_ttfb.observe(&o.wait_ms);
        self.blocked.observe(&o.blocked_ms);
        self.dns.observe(&o.dns_ms);
        self.tcp.observe(&o.connect_ms);
        self.tls.observe(&o.tls_ms);
        self.sending.observe(&o.send_ms);
        self.receiving.observe(&o.receive_ms);

        self.req_fail_rate.add_rate(!o.success);
        let http_failed = o.is_transport_error() || o.status.is_some_and(|s| s >= 400);
        self.http_req_failed.add_rate(http_failed);

        if sanitize(&o.duration_ms) > self.slow_threshold_ms {
            self.req_slow.add(1);
        }

        match (&o.error_kind, o.success) {
            (Some(kind), _) => self.request_error(kind),
            (None, false) => self.request_error(ERROR_KIND_STATUS),
            (None, true) => {}
        }
    }

    /// A request that could not be sent because the token refresh failed.
    pub fn record_auth_failure(&self) {
        self.req_fail_rate.add_rate(true);
        self.request_error(ERROR_KIND_AUTH);
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        if let Some(h) = self.tagged(self.checks, TAG_CHECK, name) {
            h.add_rate(passed);
        }
    }

    pub fn record_iteration(&self, duration: Duration, success: bool) {
        if success {
            self.iterations_success.add(1);
        } else {
            self.iterations_failure.add(1);
        }
        self.iteration_duration.observe(&duration);
    }

    pub fn record_dropped(&self, n: u64) {
        self.dropped_iterations.add(n);
    }

    /// Iterations aborted at drain timeout; they also count as failed iterations.
    pub fn record_incomplete(&self, n: u64) {
        self.incomplete_iterations.add(n);
        self.iterations_failure.add(n);
    }

    pub fn record_token_fetch(&self, ok: bool) {
        self.token_fetches.add(1);
        if !ok {
            self.token_fetch_failures.add(1);
        }
    }

    pub fn vus(&self) -> &MetricHandle {
        &self.vus
    }

    pub fn vus_max(&self) -> &MetricHandle {
        &self.vus_max
    }

    pub fn requests_total(&self) -> u64 {
        self.http_reqs.counter_value()
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.req_fail_rate.rate_value().hits
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations_success
            .counter_value()
            .saturating_add(self.iterations_failure.counter_value())
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_iterations.counter_value()
    }

    pub fn incomplete_total(&self) -> u64 {
        self.incomplete_iterations.counter_value()
    }

    pub fn bytes_sent_total(&self) -> u64 {
        self.data_sent.counter_value()
    }

    pub fn bytes_received_total(&self) -> u64 {
        self.data_received.counter_value()
    }

    pub fn token_fetches_total(&self) -> u64 {
        self.token_fetches.counter_value()
    }

    /// Cumulative `http_req_duration` percentile in milliseconds.
    pub fn duration_percentile(&self, percentile: f64) -> Option<f64> {
        let (id, _) = self.registry.lookup(names::HTTP_REQ_DURATION)?;
        self.registry.query(id).trend_percentile(percentile)
    }
}
