use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use volley_core::config::{AuthOptions, EndpointOptions, ScenarioOptions, Stage};
use volley_core::{ConfigOptions, ThresholdSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub(crate) fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
        {
            Some(ext) if ext == "yml" || ext == "yaml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    api: ApiFile,

    #[serde(default)]
    auth: AuthFile,

    #[serde(rename = "insecureSkipTLSVerify")]
    insecure_skip_tls_verify: Option<bool>,

    #[serde(default)]
    scenarios: BTreeMap<String, ScenarioFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthFile {
    enabled: Option<bool>,
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioFile {
    /// constant-arrival-rate | staged | fixed
    executor: Option<String>,

    // constant-arrival-rate
    rate: Option<u64>,
    time_unit: Option<FileDuration>,
    #[serde(rename = "preAllocatedVUs")]
    pre_allocated_vus: Option<u64>,
    #[serde(rename = "maxVUs")]
    max_vus: Option<u64>,

    // staged
    #[serde(default)]
    stages: Vec<StageFile>,
    #[serde(rename = "startVUs")]
    start_vus: Option<u64>,
    interpolation: Option<String>,

    // fixed
    vus: Option<u64>,
    duration: Option<FileDuration>,

    method: Option<String>,
    endpoint: Option<String>,
    #[serde(default)]
    endpoints: Vec<EndpointFile>,
    expected_status: Option<u16>,
    acceptable_statuses: Option<Vec<u16>>,
    custom_payload: Option<serde_json::Value>,
    #[serde(rename = "payloadSizeKB")]
    payload_size_kb: Option<u64>,

    timeout: Option<FileDuration>,
    sleep: Option<FileDuration>,
    slow_threshold: Option<f64>,
    require_auth: Option<bool>,
    refresh_token: Option<bool>,
    #[serde(rename = "insecureSkipTLSVerify")]
    insecure_skip_tls_verify: Option<bool>,

    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdExprFile>,

    drain_timeout: Option<FileDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageFile {
    duration: FileDuration,
    target: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointFile {
    endpoint: Option<String>,
    method: Option<String>,
    payload: Option<serde_json::Value>,
    weight: Option<f64>,
    expected_status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdExprFile {
    One(String),
    Many(Vec<String>),
}

/// A duration written as a string (`"1m30s"`) or a number of seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FileDuration(Duration);

impl<'de> Deserialize<'de> for FileDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = FileDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FileDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| FileDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(FileDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(FileDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn dur(d: Option<FileDuration>) -> Option<Duration> {
    d.map(|d| d.0)
}

impl From<ScenarioFile> for ScenarioOptions {
    fn from(s: ScenarioFile) -> Self {
        let thresholds = s
            .thresholds
            .into_iter()
            .map(|(metric, exprs)| ThresholdSet {
                metric,
                expressions: match exprs {
                    ThresholdExprFile::One(e) => vec![e],
                    ThresholdExprFile::Many(v) => v,
                },
            })
            .collect();

        ScenarioOptions {
            executor: s.executor,
            rate: s.rate,
            time_unit: dur(s.time_unit),
            pre_allocated_vus: s.pre_allocated_vus,
            max_vus: s.max_vus,
            stages: s
                .stages
                .into_iter()
                .map(|st| Stage {
                    duration: st.duration.0,
                    target: st.target,
                })
                .collect(),
            start_vus: s.start_vus,
            interpolation: s.interpolation,
            vus: s.vus,
            duration: dur(s.duration),
            method: s.method,
            endpoint: s.endpoint,
            endpoints: s
                .endpoints
                .into_iter()
                .map(|e| EndpointOptions {
                    endpoint: e.endpoint,
                    method: e.method,
                    payload: e.payload,
                    weight: e.weight,
                    expected_status: e.expected_status,
                })
                .collect(),
            expected_status: s.expected_status,
            acceptable_statuses: s.acceptable_statuses,
            custom_payload: s.custom_payload,
            payload_size_kb: s.payload_size_kb,
            timeout: dur(s.timeout),
            sleep: dur(s.sleep),
            slow_threshold_ms: s.slow_threshold,
            require_auth: s.require_auth,
            refresh_token: s.refresh_token,
            insecure_skip_tls_verify: s.insecure_skip_tls_verify,
            thresholds,
            drain_timeout: dur(s.drain_timeout),
        }
    }
}

impl From<ConfigFile> for ConfigOptions {
    fn from(f: ConfigFile) -> Self {
        ConfigOptions {
            base_url: f.api.base_url,
            auth: AuthOptions {
                enabled: f.auth.enabled,
                token_url: f.auth.token_url,
                client_id: f.auth.client_id,
                client_secret: f.auth.client_secret,
            },
            insecure_skip_tls_verify: f.insecure_skip_tls_verify,
            scenarios: f
                .scenarios
                .into_iter()
                .map(|(name, s)| (name, s.into()))
                .collect(),
        }
    }
}

pub(crate) fn parse_config(text: &str, format: ConfigFormat) -> anyhow::Result<ConfigOptions> {
    let file: ConfigFile = match format {
        ConfigFormat::Json => serde_json::from_str(text).context("invalid JSON")?,
        ConfigFormat::Yaml => serde_yaml::from_str(text).context("invalid YAML")?,
    };
    Ok(file.into())
}

pub(crate) async fn read_config_text(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, format: ConfigFormat) -> ConfigOptions {
        parse_config(text, format).unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.yml")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.YAML")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.json")),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config")),
            ConfigFormat::Json
        );
    }

    #[test]
    fn loads_json_with_arrival_rate_scenario() {
        let cfg = parse(
            r#"{
                "api": { "baseUrl": "https://api.example.com" },
                "auth": { "tokenUrl": "https://auth.example.com/token", "clientId": "id", "clientSecret": "s" },
                "insecureSkipTLSVerify": true,
                "scenarios": {
                    "default": {
                        "executor": "constant-arrival-rate",
                        "rate": 100,
                        "timeUnit": "1s",
                        "duration": "1m30s",
                        "preAllocatedVUs": 20,
                        "maxVUs": 200,
                        "payloadSizeKB": 4,
                        "sleep": 0.5,
                        "slowThreshold": 1500,
                        "thresholds": { "http_req_duration": ["p(95)<200", "p(99)<400"], "checks": "rate>0.99" }
                    }
                }
            }"#,
            ConfigFormat::Json,
        );

        assert_eq!(cfg.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(cfg.auth.client_id.as_deref(), Some("id"));
        assert_eq!(cfg.auth.enabled, None);
        assert_eq!(cfg.insecure_skip_tls_verify, Some(true));

        let s = cfg
            .scenarios
            .get("default")
            .unwrap_or_else(|| panic!("missing default scenario"));
        assert_eq!(s.executor.as_deref(), Some("constant-arrival-rate"));
        assert_eq!(s.rate, Some(100));
        assert_eq!(s.time_unit, Some(Duration::from_secs(1)));
        assert_eq!(s.duration, Some(Duration::from_secs(90)));
        assert_eq!(s.pre_allocated_vus, Some(20));
        assert_eq!(s.max_vus, Some(200));
        assert_eq!(s.payload_size_kb, Some(4));
        assert_eq!(s.sleep, Some(Duration::from_millis(500)));
        assert_eq!(s.slow_threshold_ms, Some(1500.0));

        assert_eq!(
            s.thresholds,
            vec![
                ThresholdSet::new("checks", &["rate>0.99"]),
                ThresholdSet::new("http_req_duration", &["p(95)<200", "p(99)<400"]),
            ]
        );
    }

    #[test]
    fn loads_yaml_with_stages_and_mixed_endpoints() {
        let cfg = parse(
            r#"
api:
  baseUrl: http://localhost:8080
auth:
  enabled: false
scenarios:
  ramp:
    stages:
      - duration: 30s
        target: 10
      - duration: 15
        target: 0
    startVUs: 2
    interpolation: step
    method: MIXED
    endpoints:
      - endpoint: /v1/items
        weight: 0.7
      - endpoint: /v1/items
        method: POST
        weight: 0.3
        expectedStatus: 201
        payload:
          name: "item-{{uuid}}"
"#,
            ConfigFormat::Yaml,
        );

        assert_eq!(cfg.auth.enabled, Some(false));
        let s = cfg
            .scenarios
            .get("ramp")
            .unwrap_or_else(|| panic!("missing ramp scenario"));
        assert_eq!(s.executor, None);
        assert_eq!(s.start_vus, Some(2));
        assert_eq!(s.interpolation.as_deref(), Some("step"));
        assert_eq!(
            s.stages,
            vec![
                Stage {
                    duration: Duration::from_secs(30),
                    target: 10,
                },
                Stage {
                    duration: Duration::from_secs(15),
                    target: 0,
                },
            ]
        );
        assert_eq!(s.method.as_deref(), Some("MIXED"));
        assert_eq!(s.endpoints.len(), 2);
        assert_eq!(s.endpoints[1].expected_status, Some(201));
        assert_eq!(
            s.endpoints[1].payload,
            Some(serde_json::json!({ "name": "item-{{uuid}}" }))
        );
    }

    #[test]
    fn rejects_malformed_durations() {
        let err = parse_config(
            r#"{ "scenarios": { "default": { "duration": "soon" } } }"#,
            ConfigFormat::Json,
        );
        assert!(err.is_err());
    }
}
