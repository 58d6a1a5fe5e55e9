use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::Rng;
use volley_http::HttpRequest;

use crate::config::{EndpointChoice, HttpMethod, PayloadSpec, RequestPlan, ScenarioConfig};
use crate::error::{Error, Result};

const PLACEHOLDER_TIMESTAMP: &str = "{{timestamp}}";
const PLACEHOLDER_RANDOM: &str = "{{random}}";
const FILLER_FIELD: &str = "dadosEntrada";

/// Index of the first weight whose cumulative sum reaches `draw`.
///
/// Weights need not sum to one. When `draw` lies beyond the total, the first entry wins.
pub fn select_weighted(weights: &[f64], draw: f64) -> usize {
    let mut cumulative = 0.0;
    for (idx, w) in weights.iter().enumerate() {
        cumulative += w;
        if draw <= cumulative {
            return idx;
        }
    }
    0
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Lit(String),
    Timestamp,
    Random,
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    None,
    Static(Bytes),
    Template(Vec<Part>),
}

fn compile_template(raw: &str) -> Body {
    if !raw.contains(PLACEHOLDER_TIMESTAMP) && !raw.contains(PLACEHOLDER_RANDOM) {
        return Body::Static(Bytes::from(raw.to_string()));
    }

    let mut parts = Vec::new();
    let mut rest = raw;
    loop {
        let ts = rest.find(PLACEHOLDER_TIMESTAMP);
        let rnd = rest.find(PLACEHOLDER_RANDOM);
        let (at, part, len) = match (ts, rnd) {
            (Some(t), Some(r)) if t < r => (t, Part::Timestamp, PLACEHOLDER_TIMESTAMP.len()),
            (_, Some(r)) => (r, Part::Random, PLACEHOLDER_RANDOM.len()),
            (Some(t), None) => (t, Part::Timestamp, PLACEHOLDER_TIMESTAMP.len()),
            (None, None) => break,
        };
        if at > 0 {
            parts.push(Part::Lit(rest[..at].to_string()));
        }
        parts.push(part);
        rest = &rest[at + len..];
    }
    if !rest.is_empty() {
        parts.push(Part::Lit(rest.to_string()));
    }
    Body::Template(parts)
}

fn filler_body(size_kb: u64) -> Bytes {
    let n = usize::try_from(size_kb.saturating_mul(1024)).unwrap_or(usize::MAX);
    let mut s = String::with_capacity(n + FILLER_FIELD.len() + 8);
    s.push_str("{\"");
    s.push_str(FILLER_FIELD);
    s.push_str("\":\"");
    s.extend(std::iter::repeat_n('x', n));
    s.push_str("\"}");
    Bytes::from(s)
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[derive(Debug, Clone)]
struct CompiledEndpoint {
    url: String,
    method: http::Method,
    body: Body,
    acceptable: Arc<[u16]>,
}

/// One request ready to be sent.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub url: String,
    pub method: http::Method,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub acceptable_statuses: Arc<[u16]>,
    pub timeout: Duration,
    /// Name of the status check recorded for this request.
    pub check_name: Arc<str>,
}

impl ResolvedRequest {
    pub fn into_http_request(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            timeout: Some(self.timeout),
        }
    }
}

/// Turns a scenario's request plan into concrete requests.
///
/// Bodies are serialized once at construction; per request only placeholders are filled.
#[derive(Debug, Clone)]
pub struct RequestPlanner {
    first: CompiledEndpoint,
    rest: Vec<CompiledEndpoint>,
    weights: Vec<f64>,
    timeout: Duration,
    auth_required: bool,
    check_name: Arc<str>,
}

impl RequestPlanner {
    pub fn new(scenario: &ScenarioConfig) -> Result<Self> {
        let acceptable_override: Option<Arc<[u16]>> =
            scenario.acceptable_statuses.as_deref().map(Arc::from);
        let acceptable = |expected: u16| {
            acceptable_override
                .clone()
                .unwrap_or_else(|| Arc::from([expected].as_slice()))
        };

        let (first, rest, weights) = match &scenario.plan {
            RequestPlan::Single {
                path,
                method,
                payload,
                expected_status,
            } => {
                let body = match method {
                    HttpMethod::Get => Body::None,
                    HttpMethod::Post => match payload {
                        PayloadSpec::Template(v) => compile_template(&v.to_string()),
                        PayloadSpec::Filler { size_kb } => Body::Static(filler_body(*size_kb)),
                    },
                };
                let ep = CompiledEndpoint {
                    url: join_url(&scenario.base_url, path),
                    method: method.as_http(),
                    body,
                    acceptable: acceptable(*expected_status),
                };
                (ep, Vec::new(), vec![1.0])
            }
            RequestPlan::Mixed(choices) => {
                let mut compiled = choices.iter().map(|c| {
                    compile_choice(&scenario.base_url, c, acceptable(c.expected_status))
                });
                let first = compiled.next().ok_or(Error::MissingEndpoints)?;
                let rest = compiled.collect();
                let weights = choices.iter().map(|c| c.weight).collect();
                (first, rest, weights)
            }
        };

        Ok(Self {
            first,
            rest,
            weights,
            timeout: scenario.timeout,
            auth_required: scenario.auth.is_some(),
            check_name: Arc::from(format!("{} status ok", scenario.plan.label())),
        })
    }

    pub fn plan(&self, token: Option<&str>) -> ResolvedRequest {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.plan_with(&mut rand::rng(), now_ms, token)
    }

    pub fn plan_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        now_ms: u64,
        token: Option<&str>,
    ) -> ResolvedRequest {
        let ep = if self.rest.is_empty() {
            &self.first
        } else {
            match select_weighted(&self.weights, rng.random::<f64>()) {
                0 => &self.first,
                idx => self.rest.get(idx - 1).unwrap_or(&self.first),
            }
        };

        let body = match &ep.body {
            Body::None => Bytes::new(),
            Body::Static(b) => b.clone(),
            Body::Template(parts) => {
                let mut s = String::new();
                for part in parts {
                    match part {
                        Part::Lit(lit) => s.push_str(lit),
                        Part::Timestamp => s.push_str(&now_ms.to_string()),
                        Part::Random => s.push_str(&rng.random::<f64>().to_string()),
                    }
                }
                Bytes::from(s)
            }
        };

        let mut headers = Vec::with_capacity(2);
        if !body.is_empty() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if self.auth_required
            && let Some(token) = token
        {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        ResolvedRequest {
            url: ep.url.clone(),
            method: ep.method.clone(),
            headers,
            body,
            acceptable_statuses: ep.acceptable.clone(),
            timeout: self.timeout,
            check_name: self.check_name.clone(),
        }
    }
}

fn compile_choice(base_url: &str, c: &EndpointChoice, acceptable: Arc<[u16]>) -> CompiledEndpoint {
    let body = match c.method {
        HttpMethod::Get => Body::None,
        HttpMethod::Post => match &c.payload {
            Some(v) => compile_template(&v.to_string()),
            None => Body::Static(Bytes::from_static(b"{}")),
        },
    };
    CompiledEndpoint {
        url: join_url(base_url, &c.path),
        method: c.method.as_http(),
        body,
        acceptable,
    }
}
