use volley_metrics::{MetricKind, MetricValue, Registry};

use crate::thresholds::{ThresholdAgg, ThresholdSet, parse_threshold_expr};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThresholdExpr { metric: String, error: String },
}

/// Outcome of one threshold expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric is unknown or the aggregation does not apply to its kind.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Raised at the end of a run when at least one threshold failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{failed} of {total} threshold(s) failed")]
pub struct ThresholdViolation {
    pub failed: usize,
    pub total: usize,
}

/// Evaluates every expression of every set, in order.
pub fn evaluate_thresholds(
    metrics: &Registry,
    sets: &[ThresholdSet],
) -> Result<Vec<ThresholdResult>> {
    let mut out = Vec::new();

    for set in sets {
        let lookup = metrics.lookup(&set.metric);

        for raw in &set.expressions {
            let expr = parse_threshold_expr(raw).map_err(|error| Error::InvalidThresholdExpr {
                metric: set.metric.clone(),
                error,
            })?;

            let observed = lookup.and_then(|(id, kind)| {
                let query = metrics.query(id);
                match expr.agg {
                    ThresholdAgg::P(p) if kind == MetricKind::Trend => query.trend_percentile(p),
                    agg => observed_value(query.merged_value()?, agg),
                }
            });

            out.push(ThresholdResult {
                metric: set.metric.clone(),
                expression: raw.clone(),
                observed,
                passed: observed.is_some_and(|v| expr.op.holds(v, expr.value)),
            });
        }
    }

    Ok(out)
}

fn observed_value(value: MetricValue, agg: ThresholdAgg) -> Option<f64> {
    match (value, agg) {
        (MetricValue::Counter(n), ThresholdAgg::Count) => Some(n as f64),
        (MetricValue::Rate(r), ThresholdAgg::Count) => Some(r.total as f64),
        (MetricValue::Rate(r), ThresholdAgg::Rate) => Some(r.rate().unwrap_or(0.0)),
        (MetricValue::Trend(t), ThresholdAgg::Count) => Some(t.count as f64),
        (MetricValue::Trend(t), ThresholdAgg::Avg) => t.avg,
        (MetricValue::Trend(t), ThresholdAgg::Min) => t.min,
        (MetricValue::Trend(t), ThresholdAgg::Max) => t.max,
        (MetricValue::Trend(t), ThresholdAgg::Med) => t.med,
        (MetricValue::Gauge(g), ThresholdAgg::Max) => Some(g as f64),
        _ => None,
    }
}
