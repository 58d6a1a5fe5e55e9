use std::fmt::Write as _;

use volley_core::RunSummary;
use volley_core::request_metrics::names;
use volley_metrics::{MetricSeriesSummary, MetricValue};

use super::format::*;

const PASS: &str = "✓";
const FAIL: &str = "✗";

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "scenario: {} executor={} elapsed={} state={}",
        summary.scenario,
        summary.executor,
        format_ms(Some(summary.elapsed.as_secs_f64() * 1000.0)),
        summary.final_state
    )
    .ok();

    let requests = summary.requests_total();
    let failed = match summary.metric(names::REQ_FAIL_RATE) {
        Some(MetricValue::Rate(r)) => r.hits,
        _ => 0,
    };
    writeln!(
        &mut out,
        "  requests: {requests} (failed {failed}, fail rate {})",
        format_percent(summary.fail_rate())
    )
    .ok();

    let iterations = counter(summary, names::ITERATIONS);
    writeln!(
        &mut out,
        "  iterations: {iterations} (dropped {}, incomplete {})",
        summary.dropped_iterations, summary.incomplete_iterations
    )
    .ok();

    let secs = summary.elapsed.as_secs_f64().max(1e-9);
    let received = counter(summary, names::DATA_RECEIVED);
    let sent = counter(summary, names::DATA_SENT);
    writeln!(
        &mut out,
        "  rates: rps={} iters/s={}",
        format_rate(requests as f64 / secs),
        format_rate(iterations as f64 / secs)
    )
    .ok();
    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(received),
        format_bytes(sent)
    )
    .ok();

    render_checks(summary, &mut out);
    render_errors(summary, &mut out);
    render_trends(&summary.metrics, &mut out);
    render_metrics(&summary.metrics, &mut out);
    render_thresholds(summary, &mut out);

    out
}

fn counter(summary: &RunSummary, name: &str) -> u64 {
    match summary.metric(name) {
        Some(MetricValue::Counter(n)) => *n,
        _ => 0,
    }
}

fn render_checks(summary: &RunSummary, out: &mut String) {
    if summary.checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in &summary.checks {
        let mark = if c.fails == 0 { PASS } else { FAIL };
        writeln!(
            out,
            "  {mark} {} (passes={} fails={})",
            c.name, c.passes, c.fails
        )
        .ok();
    }
}

fn render_errors(summary: &RunSummary, out: &mut String) {
    if summary.request_errors.is_empty() {
        return;
    }

    out.push_str("\nerrors\n");
    for (kind, n) in &summary.request_errors {
        writeln!(out, "  {kind} = {n}").ok();
    }
}

fn render_trends(series: &[MetricSeriesSummary], out: &mut String) {
    let mut rows: Vec<_> = series
        .iter()
        .filter_map(|s| match &s.value {
            MetricValue::Trend(t) if t.count > 0 => Some((s.name.as_str(), t)),
            _ => None,
        })
        .collect();
    if rows.is_empty() {
        return;
    }
    rows.sort_by(|a, b| a.0.cmp(b.0));

    writeln!(
        out,
        "\n{:<24}{:>11}{:>11}{:>11}{:>11}{:>11}{:>11}{:>11}{:>9}",
        "trends", "avg", "min", "med", "max", "p(90)", "p(95)", "p(99)", "n"
    )
    .ok();
    for (name, t) in rows {
        writeln!(
            out,
            "  {:<22}{:>11}{:>11}{:>11}{:>11}{:>11}{:>11}{:>11}{:>9}",
            name,
            format_ms(t.avg),
            format_ms(t.min),
            format_ms(t.med),
            format_ms(t.max),
            format_ms(t.p90),
            format_ms(t.p95),
            format_ms(t.p99),
            t.count
        )
        .ok();
    }
}

fn render_metrics(series: &[MetricSeriesSummary], out: &mut String) {
    let mut rows: Vec<_> = series
        .iter()
        .filter(|s| {
            !matches!(s.value, MetricValue::Trend(_))
                && s.name != names::CHECKS
                && s.name != names::VUS_MAX
        })
        .collect();
    if rows.is_empty() {
        return;
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    // `vus` correctly ends at 0; show it together with its peak.
    let vus_peak = series.iter().find_map(|s| match (&s.name[..], &s.value) {
        (names::VUS_MAX, MetricValue::Gauge(v)) => Some(*v),
        _ => None,
    });

    out.push_str("\nmetrics\n");
    for s in rows {
        match (&s.value, vus_peak) {
            (MetricValue::Gauge(end), Some(peak)) if s.name == names::VUS => {
                writeln!(out, "  {} = end={end} peak={peak}", s.name).ok();
            }
            (MetricValue::Counter(v), _) => {
                writeln!(out, "  {} = {v}", s.name).ok();
            }
            (MetricValue::Gauge(v), _) => {
                writeln!(out, "  {} = {v}", s.name).ok();
            }
            (MetricValue::Rate(r), _) => {
                writeln!(
                    out,
                    "  {} = {} ({} of {})",
                    s.name,
                    format_percent(r.rate()),
                    r.hits,
                    r.total
                )
                .ok();
            }
            (MetricValue::Trend(_), _) => {}
        }
    }
}

fn render_thresholds(summary: &RunSummary, out: &mut String) {
    if summary.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &summary.thresholds {
        let mark = if t.passed { PASS } else { FAIL };
        match t.observed {
            Some(obs) => writeln!(
                out,
                "  {mark} {}: {} (observed {obs:.3})",
                t.metric, t.expression
            )
            .ok(),
            None => writeln!(
                out,
                "  {mark} {}: {} (missing series)",
                t.metric, t.expression
            )
            .ok(),
        };
    }
}
