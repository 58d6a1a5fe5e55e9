use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use volley_metrics::{MetricSeriesSummary, MetricValue, Registry};

use crate::request_metrics::{TAG_CHECK, TAG_ERROR_KIND, names};
use crate::thresholds_eval::{ThresholdResult, ThresholdViolation};

/// Lifecycle of one run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Init,
    Setup,
    Running,
    Draining,
    Summarizing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Final result of a run. Built once, after all workers stopped.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    pub executor: String,
    pub started_at: SystemTime,
    pub elapsed: Duration,
    pub final_state: RunState,
    /// One merged series per metric.
    pub metrics: Vec<MetricSeriesSummary>,
    pub checks: Vec<CheckSummary>,
    /// `request_errors` split by `error_kind`.
    pub request_errors: BTreeMap<String, u64>,
    pub thresholds: Vec<ThresholdResult>,
    pub dropped_iterations: u64,
    pub incomplete_iterations: u64,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.value)
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn check_thresholds(&self) -> Result<(), ThresholdViolation> {
        let failed = self.thresholds.iter().filter(|t| !t.passed).count();
        if failed == 0 {
            Ok(())
        } else {
            Err(ThresholdViolation {
                failed,
                total: self.thresholds.len(),
            })
        }
    }

    pub fn requests_total(&self) -> u64 {
        match self.metric(names::HTTP_REQS) {
            Some(MetricValue::Counter(n)) => *n,
            _ => 0,
        }
    }

    /// `req_fail_rate`, `None` when nothing was recorded.
    pub fn fail_rate(&self) -> Option<f64> {
        match self.metric(names::REQ_FAIL_RATE) {
            Some(MetricValue::Rate(r)) => r.rate(),
            _ => None,
        }
    }
}

/// Per-name check results, sorted by name.
pub fn collect_checks(registry: &Registry) -> Vec<CheckSummary> {
    let mut out: Vec<CheckSummary> = Vec::new();
    for series in registry.summarize() {
        if series.name != names::CHECKS {
            continue;
        }
        let MetricValue::Rate(rate) = series.value else {
            continue;
        };
        let Some((_, name)) = series.tags.iter().find(|(k, _)| k == TAG_CHECK) else {
            continue;
        };

        match out.iter_mut().find(|c| &c.name == name) {
            Some(c) => {
                c.passes += rate.hits;
                c.fails += rate.total - rate.hits;
            }
            None => out.push(CheckSummary {
                name: name.clone(),
                passes: rate.hits,
                fails: rate.total - rate.hits,
            }),
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

pub fn collect_request_errors(registry: &Registry) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    for series in registry.summarize() {
        if series.name != names::REQUEST_ERRORS {
            continue;
        }
        let MetricValue::Counter(n) = series.value else {
            continue;
        };
        if let Some((_, kind)) = series.tags.iter().find(|(k, _)| k == TAG_ERROR_KIND) {
            *out.entry(kind.clone()).or_default() += n;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_metrics::RunMetrics;

    #[test]
    fn checks_are_collected_by_name() {
        let m = RunMetrics::new("default", 2000.0);
        m.record_check("token status 200", true);
        m.record_check("GET status ok", true);
        m.record_check("GET status ok", false);
        m.record_check("GET status ok", true);

        let checks = collect_checks(m.registry());
        assert_eq!(
            checks,
            vec![
                CheckSummary {
                    name: "GET status ok".to_string(),
                    passes: 2,
                    fails: 1,
                },
                CheckSummary {
                    name: "token status 200".to_string(),
                    passes: 1,
                    fails: 0,
                },
            ]
        );
    }

    #[test]
    fn request_errors_are_collected_by_kind() {
        let m = RunMetrics::new("default", 2000.0);
        m.record_auth_failure();
        m.record_auth_failure();
        m.record_request(&crate::request_metrics::RequestOutcome {
            error_kind: Some("timeout".to_string()),
            ..Default::default()
        });

        let errors = collect_request_errors(m.registry());
        assert_eq!(errors.get("auth"), Some(&2));
        assert_eq!(errors.get("timeout"), Some(&1));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn threshold_violation_counts_failures() {
        let summary = RunSummary {
            scenario: "default".to_string(),
            executor: "fixed".to_string(),
            started_at: SystemTime::now(),
            elapsed: Duration::from_secs(1),
            final_state: RunState::Done,
            metrics: Vec::new(),
            checks: Vec::new(),
            request_errors: BTreeMap::new(),
            thresholds: vec![
                ThresholdResult {
                    metric: "http_req_duration".to_string(),
                    expression: "p(99)<250".to_string(),
                    observed: Some(300.0),
                    passed: false,
                },
                ThresholdResult {
                    metric: "req_fail_rate".to_string(),
                    expression: "rate<0.005".to_string(),
                    observed: Some(0.0),
                    passed: true,
                },
            ],
            dropped_iterations: 0,
            incomplete_iterations: 0,
        };

        assert!(!summary.thresholds_passed());
        let err = summary
            .check_thresholds()
            .err()
            .unwrap_or_else(|| panic!("expected violation"));
        assert_eq!(err.failed, 1);
        assert_eq!(err.total, 2);
        assert_eq!(summary.requests_total(), 0);
        assert_eq!(summary.fail_rate(), None);
    }

    #[test]
    fn run_state_names() {
        assert_eq!(RunState::Summarizing.to_string(), "summarizing");
        assert!(RunState::Init < RunState::Done);
    }
}
