use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::thresholds::{ThresholdSet, parse_threshold_expr, with_default_thresholds};

pub const DEFAULT_SCENARIO: &str = "default";
pub const DEFAULT_ENDPOINT: &str = "/v1/testes";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_PAYLOAD_SIZE_KB: u64 = 25;
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 2000.0;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ENDPOINT_WEIGHT: f64 = 0.5;
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_PRE_ALLOCATED_VUS: u64 = 50;
pub const DEFAULT_MAX_VUS: u64 = 1000;
pub const DEFAULT_FIXED_VUS: u64 = 10;
pub const DEFAULT_FIXED_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_START_VUS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// How the staged executor moves between stage targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Executor {
    /// Open model: `rate` iteration starts per `time_unit`, independent of response times.
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
    },

    /// Closed model with a time-varying number of active VUs.
    Staged {
        start_vus: u64,
        stages: Vec<Stage>,
        interpolation: Interpolation,
    },

    /// Closed model: `vus` workers loop back-to-back.
    Fixed { vus: u64, duration: Duration },
}

impl Executor {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Self::ConstantArrivalRate { .. } => ExecutorKind::ConstantArrivalRate,
            Self::Staged { .. } => ExecutorKind::Staged,
            Self::Fixed { .. } => ExecutorKind::Fixed,
        }
    }

    /// Workers spawned for the run.
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::ConstantArrivalRate { max_vus, .. } => *max_vus,
            Self::Staged {
                start_vus, stages, ..
            } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
            Self::Fixed { vus, .. } => *vus,
        }
    }

    /// Time during which new iterations may start.
    pub fn duration(&self) -> Duration {
        match self {
            Self::ConstantArrivalRate { duration, .. } | Self::Fixed { duration, .. } => *duration,
            Self::Staged { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }
}

/// Executor name as written in scenario files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ExecutorKind {
    #[strum(serialize = "constant-arrival-rate")]
    ConstantArrivalRate,

    #[strum(to_string = "staged", serialize = "ramping-vus")]
    Staged,

    #[strum(to_string = "fixed", serialize = "constant-vus")]
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
        }
    }
}

/// Request body source for a `POST`.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadSpec {
    /// JSON template with `{{timestamp}}` / `{{random}}` placeholders.
    Template(serde_json::Value),
    /// `{"dadosEntrada": "xxx…"}` of `size_kb` KiB.
    Filler { size_kb: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointChoice {
    pub path: String,
    pub method: HttpMethod,
    /// Only used for `POST`; `None` sends `{}`.
    pub payload: Option<serde_json::Value>,
    pub weight: f64,
    pub expected_status: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPlan {
    Single {
        path: String,
        method: HttpMethod,
        payload: PayloadSpec,
        expected_status: u16,
    },
    Mixed(Vec<EndpointChoice>),
}

impl RequestPlan {
    /// `GET`, `POST` or `MIXED`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single {
                method: HttpMethod::Get,
                ..
            } => "GET",
            Self::Single {
                method: HttpMethod::Post,
                ..
            } => "POST",
            Self::Mixed(_) => "MIXED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Fetch lazily from workers instead of once during setup.
    pub refresh_token: bool,
}

/// Fully resolved scenario. Immutable once built and shared read-only by all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    pub base_url: String,
    pub plan: RequestPlan,
    /// Overrides the per-endpoint expected status when set.
    pub acceptable_statuses: Option<Vec<u16>>,
    pub timeout: Duration,
    pub sleep: Option<Duration>,
    pub slow_threshold_ms: f64,
    /// `Some` when requests must carry a bearer token.
    pub auth: Option<AuthSettings>,
    pub insecure_skip_tls_verify: bool,
    pub executor: Executor,
    pub thresholds: Vec<ThresholdSet>,
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    pub enabled: Option<bool>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EndpointOptions {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub weight: Option<f64>,
    pub expected_status: Option<u16>,
}

/// One scenario as written in the configuration file; every field optional.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub executor: Option<String>,

    // Constant arrival rate
    pub rate: Option<u64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,

    // Staged
    pub stages: Vec<Stage>,
    pub start_vus: Option<u64>,
    pub interpolation: Option<String>,

    // Fixed
    pub vus: Option<u64>,
    pub duration: Option<Duration>,

    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub endpoints: Vec<EndpointOptions>,
    pub expected_status: Option<u16>,
    pub acceptable_statuses: Option<Vec<u16>>,
    pub custom_payload: Option<serde_json::Value>,
    pub payload_size_kb: Option<u64>,
    pub timeout: Option<Duration>,
    pub sleep: Option<Duration>,
    pub slow_threshold_ms: Option<f64>,
    pub require_auth: Option<bool>,
    pub refresh_token: Option<bool>,
    pub insecure_skip_tls_verify: Option<bool>,
    pub thresholds: Vec<ThresholdSet>,
    pub drain_timeout: Option<Duration>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub base_url: Option<String>,
    pub auth: AuthOptions,
    pub insecure_skip_tls_verify: Option<bool>,
    pub scenarios: BTreeMap<String, ScenarioOptions>,
}

/// Command-line overrides; they win over file values.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub rate: Option<u64>,
    pub insecure_skip_tls_verify: bool,
    pub drain_timeout: Option<Duration>,
}

/// Picks `requested` (or `default`), falling back to `default` when the name is unknown.
pub fn select_scenario<'a>(
    config: &'a ConfigOptions,
    requested: Option<&str>,
) -> Result<(&'a str, &'a ScenarioOptions)> {
    let wanted = requested.unwrap_or(DEFAULT_SCENARIO);
    if let Some((name, opts)) = config.scenarios.get_key_value(wanted) {
        return Ok((name.as_str(), opts));
    }

    match config.scenarios.get_key_value(DEFAULT_SCENARIO) {
        Some((name, opts)) => {
            tracing::warn!(
                requested = wanted,
                "scenario not found; falling back to `{DEFAULT_SCENARIO}`"
            );
            Ok((name.as_str(), opts))
        }
        None => Err(Error::ScenarioNotFound(wanted.to_string())),
    }
}

/// Selects a scenario and fills every optional field, validating as it goes.
pub fn resolve_scenario(
    config: &ConfigOptions,
    requested: Option<&str>,
    overrides: &RunOverrides,
) -> Result<Arc<ScenarioConfig>> {
    let (name, s) = select_scenario(config, requested)?;

    let base_url = config
        .base_url
        .as_deref()
        .map(|u| u.trim_end_matches('/'))
        .filter(|u| !u.is_empty())
        .ok_or(Error::MissingBaseUrl)?;
    let parsed = url::Url::parse(base_url).map_err(|_| Error::InvalidBaseUrl(base_url.into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidBaseUrl(base_url.into()));
    }

    let executor = resolve_executor(s, overrides)?;
    let plan = resolve_plan(s)?;

    if let Some(statuses) = &s.acceptable_statuses {
        for &code in statuses {
            validate_status(code)?;
        }
    }

    let timeout = s.timeout.unwrap_or(DEFAULT_TIMEOUT);
    if timeout.is_zero() {
        return Err(Error::InvalidTimeout);
    }

    let auth_enabled = config.auth.enabled != Some(false) && s.require_auth != Some(false);
    let auth = if auth_enabled {
        let token_url = config
            .auth
            .token_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(Error::MissingTokenUrl)?;
        Some(AuthSettings {
            token_url,
            client_id: config.auth.client_id.clone().unwrap_or_default(),
            client_secret: config.auth.client_secret.clone().unwrap_or_default(),
            refresh_token: s.refresh_token.unwrap_or(false),
        })
    } else {
        None
    };

    let thresholds = with_default_thresholds(s.thresholds.clone());
    for set in &thresholds {
        for expr in &set.expressions {
            parse_threshold_expr(expr).map_err(|error| {
                crate::thresholds_eval::Error::InvalidThresholdExpr {
                    metric: set.metric.clone(),
                    error,
                }
            })?;
        }
    }

    Ok(Arc::new(ScenarioConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        plan,
        acceptable_statuses: s.acceptable_statuses.clone(),
        timeout,
        sleep: s.sleep.filter(|d| !d.is_zero()),
        slow_threshold_ms: s
            .slow_threshold_ms
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_SLOW_THRESHOLD_MS),
        auth,
        insecure_skip_tls_verify: overrides.insecure_skip_tls_verify
            || s.insecure_skip_tls_verify
                .or(config.insecure_skip_tls_verify)
                .unwrap_or(false),
        executor,
        thresholds,
        drain_timeout: overrides
            .drain_timeout
            .or(s.drain_timeout)
            .unwrap_or(DEFAULT_DRAIN_TIMEOUT),
    }))
}

fn resolve_executor(s: &ScenarioOptions, overrides: &RunOverrides) -> Result<Executor> {
    let kind = match s.executor.as_deref() {
        Some(name) => name
            .parse::<ExecutorKind>()
            .map_err(|_| Error::InvalidExecutor(name.to_string()))?,
        None if !s.stages.is_empty() => ExecutorKind::Staged,
        None => ExecutorKind::Fixed,
    };

    if overrides.rate.is_some() && kind != ExecutorKind::ConstantArrivalRate {
        return Err(Error::RateOverrideNotApplicable);
    }

    // An explicit run shape from the CLI replaces the staged ramp with a fixed pool.
    let cli_shape = overrides.vus.is_some() || overrides.duration.is_some();
    let kind = if cli_shape && kind == ExecutorKind::Staged {
        ExecutorKind::Fixed
    } else {
        kind
    };

    match kind {
        ExecutorKind::ConstantArrivalRate => {
            let rate = overrides.rate.or(s.rate);
            let duration = overrides.duration.or(s.duration);
            let (Some(rate), Some(duration)) = (rate, duration) else {
                return Err(Error::MissingArrivalRateFields);
            };
            if rate == 0 {
                return Err(Error::InvalidRate);
            }
            if duration.is_zero() {
                return Err(Error::InvalidDuration);
            }

            let time_unit = s.time_unit.unwrap_or(DEFAULT_TIME_UNIT);
            if time_unit.is_zero() {
                return Err(Error::InvalidTimeUnit);
            }

            let pre_allocated_vus = overrides
                .vus
                .or(s.pre_allocated_vus)
                .unwrap_or(DEFAULT_PRE_ALLOCATED_VUS);
            if pre_allocated_vus == 0 {
                return Err(Error::InvalidPreAllocatedVus);
            }
            let max_vus = s.max_vus.unwrap_or(DEFAULT_MAX_VUS.max(pre_allocated_vus));
            if max_vus < pre_allocated_vus {
                return Err(Error::InvalidMaxVus);
            }

            Ok(Executor::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
            })
        }
        ExecutorKind::Staged => {
            if s.stages.is_empty() || s.stages.iter().all(|st| st.duration.is_zero()) {
                return Err(Error::InvalidStages);
            }
            let interpolation = match s.interpolation.as_deref() {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| Error::InvalidInterpolation(raw.to_string()))?,
                None => Interpolation::default(),
            };
            let executor = Executor::Staged {
                start_vus: s.start_vus.unwrap_or(DEFAULT_START_VUS),
                stages: s.stages.clone(),
                interpolation,
            };
            if executor.max_vus() == 0 {
                return Err(Error::InvalidVus);
            }
            Ok(executor)
        }
        ExecutorKind::Fixed => {
            let vus = overrides.vus.or(s.vus).unwrap_or(DEFAULT_FIXED_VUS);
            if vus == 0 {
                return Err(Error::InvalidVus);
            }
            let duration = overrides
                .duration
                .or(s.duration)
                .unwrap_or(DEFAULT_FIXED_DURATION);
            if duration.is_zero() {
                return Err(Error::InvalidDuration);
            }
            Ok(Executor::Fixed { vus, duration })
        }
    }
}

fn parse_method(raw: Option<&str>) -> Result<Option<HttpMethod>> {
    match raw {
        None => Ok(None),
        Some(m) if m.eq_ignore_ascii_case("MIXED") => Ok(None),
        Some(m) => m
            .parse::<HttpMethod>()
            .map(Some)
            .map_err(|_| Error::InvalidMethod(m.to_string())),
    }
}

fn validate_status(code: u16) -> Result<u16> {
    if (100..=599).contains(&code) {
        Ok(code)
    } else {
        Err(Error::InvalidStatus(code))
    }
}

fn resolve_plan(s: &ScenarioOptions) -> Result<RequestPlan> {
    let mixed = s
        .method
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("MIXED"));

    if mixed {
        if s.endpoints.is_empty() {
            return Err(Error::MissingEndpoints);
        }
        let endpoints = s
            .endpoints
            .iter()
            .map(|e| {
                let weight = e.weight.unwrap_or(DEFAULT_ENDPOINT_WEIGHT);
                if !weight.is_finite() || weight < 0.0 {
                    return Err(Error::InvalidWeight(weight));
                }
                let method = match e.method.as_deref() {
                    Some(m) => m
                        .parse::<HttpMethod>()
                        .map_err(|_| Error::InvalidMethod(m.to_string()))?,
                    None => HttpMethod::Get,
                };
                Ok(EndpointChoice {
                    path: e
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                    method,
                    payload: e.payload.clone(),
                    weight,
                    expected_status: validate_status(
                        e.expected_status.unwrap_or(DEFAULT_EXPECTED_STATUS),
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(RequestPlan::Mixed(endpoints));
    }

    let method = parse_method(s.method.as_deref())?.unwrap_or(HttpMethod::Get);
    let payload = match &s.custom_payload {
        Some(template) => PayloadSpec::Template(template.clone()),
        None => PayloadSpec::Filler {
            size_kb: s.payload_size_kb.unwrap_or(DEFAULT_PAYLOAD_SIZE_KB),
        },
    };

    Ok(RequestPlan::Single {
        path: s
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        method,
        payload,
        expected_status: validate_status(s.expected_status.unwrap_or(DEFAULT_EXPECTED_STATUS))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(name: &str, s: ScenarioOptions) -> ConfigOptions {
        ConfigOptions {
            base_url: Some("http://127.0.0.1:8080/".to_string()),
            auth: AuthOptions {
                enabled: Some(false),
                ..AuthOptions::default()
            },
            insecure_skip_tls_verify: None,
            scenarios: BTreeMap::from([(name.to_string(), s)]),
        }
    }

    fn resolve(cfg: &ConfigOptions) -> Result<Arc<ScenarioConfig>> {
        resolve_scenario(cfg, None, &RunOverrides::default())
    }

    #[test]
    fn empty_scenario_resolves_to_fixed_pool_defaults() {
        let cfg = config_with("default", ScenarioOptions::default());
        let s = resolve(&cfg).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(s.name, "default");
        assert_eq!(s.base_url, "http://127.0.0.1:8080");
        assert_eq!(
            s.executor,
            Executor::Fixed {
                vus: 10,
                duration: Duration::from_secs(60)
            }
        );
        assert_eq!(
            s.plan,
            RequestPlan::Single {
                path: "/v1/testes".to_string(),
                method: HttpMethod::Get,
                payload: PayloadSpec::Filler { size_kb: 25 },
                expected_status: 200,
            }
        );
        assert_eq!(s.timeout, Duration::from_secs(10));
        assert_eq!(s.slow_threshold_ms, 2000.0);
        assert_eq!(s.drain_timeout, Duration::from_secs(30));
        assert!(s.auth.is_none());
        assert_eq!(s.thresholds.len(), 3);
    }

    #[test]
    fn arrival_rate_fills_vu_defaults() {
        let cfg = config_with(
            "default",
            ScenarioOptions {
                executor: Some("constant-arrival-rate".to_string()),
                rate: Some(100),
                duration: Some(Duration::from_secs(30)),
                ..ScenarioOptions::default()
            },
        );
        let s = resolve(&cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            s.executor,
            Executor::ConstantArrivalRate {
                rate: 100,
                time_unit: Duration::from_secs(1),
                duration: Duration::from_secs(30),
                pre_allocated_vus: 50,
                max_vus: 1000,
            }
        );
    }

    #[test]
    fn stages_without_executor_select_staged() {
        let cfg = config_with(
            "default",
            ScenarioOptions {
                stages: vec![
                    Stage {
                        duration: Duration::from_secs(10),
                        target: 20,
                    },
                    Stage {
                        duration: Duration::from_secs(10),
                        target: 0,
                    },
                ],
                interpolation: Some("step".to_string()),
                ..ScenarioOptions::default()
            },
        );
        let s = resolve(&cfg).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            s.executor,
            Executor::Staged {
                interpolation: Interpolation::Step,
                ..
            }
        ));
        assert_eq!(s.executor.max_vus(), 20);
        assert_eq!(s.executor.duration(), Duration::from_secs(20));
    }

    fn assert_invalid(opts: ScenarioOptions, check: impl Fn(&Error) -> bool) {
        let cfg = config_with("default", opts);
        match resolve(&cfg) {
            Ok(s) => panic!("expected error, got {s:?}"),
            Err(e) => {
                assert!(check(&e), "unexpected error: {e}");
                assert!(e.is_invalid_input());
            }
        }
    }

    #[test]
    fn validation_errors_are_reported() {
        assert_invalid(
            ScenarioOptions {
                vus: Some(0),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidVus),
        );
        assert_invalid(
            ScenarioOptions {
                executor: Some("staged".to_string()),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidStages),
        );
        assert_invalid(
            ScenarioOptions {
                executor: Some("constant-arrival-rate".to_string()),
                rate: Some(10),
                duration: Some(Duration::from_secs(1)),
                time_unit: Some(Duration::ZERO),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidTimeUnit),
        );
        assert_invalid(
            ScenarioOptions {
                executor: Some("constant-arrival-rate".to_string()),
                rate: Some(10),
                duration: Some(Duration::from_secs(1)),
                pre_allocated_vus: Some(20),
                max_vus: Some(10),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidMaxVus),
        );
        assert_invalid(
            ScenarioOptions {
                executor: Some("warp-speed".to_string()),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidExecutor(_)),
        );
        assert_invalid(
            ScenarioOptions {
                method: Some("DELETE".to_string()),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::InvalidMethod(_)),
        );
        assert_invalid(
            ScenarioOptions {
                method: Some("MIXED".to_string()),
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::MissingEndpoints),
        );
        assert_invalid(
            ScenarioOptions {
                thresholds: vec![ThresholdSet::new("http_req_duration", &["p(99)<<1"])],
                ..ScenarioOptions::default()
            },
            |e| matches!(e, Error::Threshold(_)),
        );
    }

    #[test]
    fn unknown_scenario_falls_back_to_default() {
        let cfg = config_with("default", ScenarioOptions::default());
        let s = resolve_scenario(&cfg, Some("nope"), &RunOverrides::default())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(s.name, "default");

        let cfg = config_with("smoke", ScenarioOptions::default());
        let err = resolve_scenario(&cfg, Some("nope"), &RunOverrides::default()).err();
        assert!(matches!(err, Some(Error::ScenarioNotFound(_))));
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let cfg = config_with(
            "default",
            ScenarioOptions {
                vus: Some(3),
                duration: Some(Duration::from_secs(5)),
                drain_timeout: Some(Duration::from_secs(9)),
                ..ScenarioOptions::default()
            },
        );
        let overrides = RunOverrides {
            vus: Some(7),
            duration: Some(Duration::from_secs(2)),
            insecure_skip_tls_verify: true,
            drain_timeout: Some(Duration::from_secs(1)),
            ..RunOverrides::default()
        };
        let s = resolve_scenario(&cfg, None, &overrides).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            s.executor,
            Executor::Fixed {
                vus: 7,
                duration: Duration::from_secs(2)
            }
        );
        assert!(s.insecure_skip_tls_verify);
        assert_eq!(s.drain_timeout, Duration::from_secs(1));

        let rate = RunOverrides {
            rate: Some(10),
            ..RunOverrides::default()
        };
        let err = resolve_scenario(&cfg, None, &rate).err();
        assert!(matches!(err, Some(Error::RateOverrideNotApplicable)));
    }

    #[test]
    fn auth_requires_token_url_unless_disabled_for_scenario() {
        let mut cfg = config_with("default", ScenarioOptions::default());
        cfg.auth.enabled = None;
        assert!(matches!(resolve(&cfg).err(), Some(Error::MissingTokenUrl)));

        cfg.auth.token_url = Some("http://127.0.0.1:1/token".to_string());
        let s = resolve(&cfg).unwrap_or_else(|e| panic!("{e}"));
        assert!(s.auth.as_ref().is_some_and(|a| !a.refresh_token));

        if let Some(s) = cfg.scenarios.get_mut("default") {
            s.require_auth = Some(false);
        }
        assert!(resolve(&cfg).unwrap_or_else(|e| panic!("{e}")).auth.is_none());
    }

    #[test]
    fn mixed_endpoints_get_default_weight_and_status() {
        let cfg = config_with(
            "default",
            ScenarioOptions {
                method: Some("MIXED".to_string()),
                endpoints: vec![
                    EndpointOptions {
                        endpoint: Some("/a".to_string()),
                        ..EndpointOptions::default()
                    },
                    EndpointOptions {
                        endpoint: Some("/b".to_string()),
                        method: Some("post".to_string()),
                        weight: Some(0.25),
                        expected_status: Some(201),
                        ..EndpointOptions::default()
                    },
                ],
                ..ScenarioOptions::default()
            },
        );
        let s = resolve(&cfg).unwrap_or_else(|e| panic!("{e}"));
        let RequestPlan::Mixed(endpoints) = &s.plan else {
            panic!("expected mixed plan, got {:?}", s.plan);
        };
        assert_eq!(endpoints[0].weight, 0.5);
        assert_eq!(endpoints[0].method, HttpMethod::Get);
        assert_eq!(endpoints[1].method, HttpMethod::Post);
        assert_eq!(endpoints[1].expected_status, 201);
        assert_eq!(s.plan.label(), "MIXED");
    }
}
