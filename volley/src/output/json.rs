use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use volley_core::{ProgressEvent, ProgressUpdate, RunSummary, ScenarioProgress};
use volley_metrics::MetricValue;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario: &volley_core::ScenarioConfig) {}

    fn progress(&self) -> Option<volley_core::ProgressFn> {
        Some(Arc::new(move |ev| match ev {
            ProgressEvent::State { state, elapsed } => emit_json_line(&JsonStateLine {
                kind: "state",
                state: state.to_string(),
                elapsed_secs: elapsed.as_secs_f64(),
            }),
            ProgressEvent::Tick(u) => emit_json_line(&build_progress_line(&u)),
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(summary));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStateLine {
    pub kind: &'static str,
    pub state: String,
    pub elapsed_secs: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: u64,
    pub scenario: String,
    pub executor: String,

    pub active_vus: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,

    pub requests_total: u64,
    pub requests_per_sec: f64,
    pub failed_requests_total: u64,
    pub error_rate: f64,

    pub iterations_total: u64,
    pub iterations_per_sec: f64,
    pub dropped_iterations_total: u64,

    pub latency_p50_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,

    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let max_vus = match &u.progress {
        ScenarioProgress::Fixed { vus, .. } => Some(*vus),
        ScenarioProgress::Staged { .. } => None,
        ScenarioProgress::ArrivalRate { max_vus, .. } => Some(*max_vus),
    };
    let m = &u.metrics;

    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs(),
        scenario: u.scenario.clone(),
        executor: u.executor.clone(),

        active_vus: m.active_vus,
        max_vus,

        requests_total: m.requests_total,
        requests_per_sec: m.rps_now,
        failed_requests_total: m.failed_requests_total,
        error_rate: m.error_rate_now,

        iterations_total: m.iterations_total,
        iterations_per_sec: m.iterations_per_sec_now,
        dropped_iterations_total: m.dropped_iterations_total,

        latency_p50_ms: m.latency_p50_ms,
        latency_p99_ms: m.latency_p99_ms,

        bytes_received_total: m.bytes_received_total,
        bytes_sent_total: m.bytes_sent_total,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub executor: String,
    pub started_at: String,
    pub elapsed_secs: f64,
    pub state: String,

    pub requests_total: u64,
    pub fail_rate: Option<f64>,
    pub dropped_iterations: u64,
    pub incomplete_iterations: u64,

    pub metrics: BTreeMap<String, JsonMetric>,
    pub checks: Vec<JsonCheck>,
    pub request_errors: BTreeMap<String, u64>,
    pub thresholds: Vec<JsonThreshold>,
    pub thresholds_passed: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonMetric {
    Counter {
        count: u64,
    },
    Gauge {
        value: i64,
    },
    Rate {
        rate: Option<f64>,
        passes: u64,
        fails: u64,
    },
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
        stdev: Option<f64>,
    },
}

impl From<&MetricValue> for JsonMetric {
    fn from(v: &MetricValue) -> Self {
        match v {
            MetricValue::Counter(count) => Self::Counter { count: *count },
            MetricValue::Gauge(value) => Self::Gauge { value: *value },
            MetricValue::Rate(r) => Self::Rate {
                rate: r.rate(),
                passes: r.hits,
                fails: r.total.saturating_sub(r.hits),
            },
            MetricValue::Trend(t) => Self::Trend {
                count: t.count,
                avg: t.avg,
                min: t.min,
                med: t.med,
                max: t.max,
                p90: t.p90,
                p95: t.p95,
                p99: t.p99,
                stdev: t.stdev,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub(crate) fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        scenario: summary.scenario.clone(),
        executor: summary.executor.clone(),
        started_at: humantime::format_rfc3339_seconds(summary.started_at).to_string(),
        elapsed_secs: summary.elapsed.as_secs_f64(),
        state: summary.final_state.to_string(),

        requests_total: summary.requests_total(),
        fail_rate: summary.fail_rate(),
        dropped_iterations: summary.dropped_iterations,
        incomplete_iterations: summary.incomplete_iterations,

        metrics: summary
            .metrics
            .iter()
            .map(|m| (m.name.clone(), JsonMetric::from(&m.value)))
            .collect(),
        checks: summary
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        request_errors: summary.request_errors.clone(),
        thresholds: summary
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed: t.observed,
                passed: t.passed,
            })
            .collect(),
        thresholds_passed: summary.thresholds_passed(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
