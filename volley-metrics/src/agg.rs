use std::sync::atomic::Ordering;

use hdrhistogram::Histogram;

use crate::metrics::{
    MetricKind, MetricStorage, MetricValue, RateSummary, TrendSummary, new_trend_histogram,
    summarize_trend, trend_percentile,
};
use crate::registry::{MetricId, Registry};

/// Adds `other` into `acc`. Samples outside `acc`'s range are clamped to its bounds
/// rather than lost.
fn merge_histogram(acc: &mut Histogram<u64>, other: &Histogram<u64>) {
    if acc.add(other).is_ok() {
        return;
    }
    for v in other.iter_recorded() {
        acc.saturating_record_n(v.value_iterated_to(), v.count_at_value());
    }
}

/// Read-side view over all series of one metric.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self { registry, metric }
    }

    pub fn sum_counter_total(&self) -> u64 {
        let mut total = 0u64;
        self.registry.visit_series(self.metric, |_, storage| {
            if let MetricStorage::Counter(c) = storage {
                total = total.saturating_add(c.load(Ordering::Relaxed));
            }
        });
        total
    }

    pub fn merge_rate(&self) -> RateSummary {
        let mut acc = RateSummary::default();
        self.registry.visit_series(self.metric, |_, storage| {
            let MetricStorage::Rate(r) = storage else {
                return;
            };
            let s = r.summary();
            acc.total = acc.total.saturating_add(s.total);
            acc.hits = acc.hits.saturating_add(s.hits);
        });
        acc
    }

    pub fn max_gauge(&self) -> i64 {
        let mut max = 0i64;
        self.registry.visit_series(self.metric, |_, storage| {
            if let MetricStorage::Gauge(g) = storage {
                max = max.max(g.load(Ordering::Relaxed));
            }
        });
        max
    }

    fn merge_trend_histogram(&self) -> Histogram<u64> {
        let mut acc = new_trend_histogram();
        self.registry.visit_series(self.metric, |_, storage| {
            if let MetricStorage::Trend(h) = storage {
                merge_histogram(&mut acc, &h.lock());
            }
        });
        acc
    }

    pub fn trend_summary(&self) -> TrendSummary {
        summarize_trend(&self.merge_trend_histogram())
    }

    /// Arbitrary percentile (0..=100) in milliseconds across all matching series.
    pub fn trend_percentile(&self, percentile: f64) -> Option<f64> {
        trend_percentile(&self.merge_trend_histogram(), percentile)
    }

    /// All matching series folded into one value of the metric's kind.
    ///
    /// A metric with no recorded series yields its zero value.
    pub fn merged_value(&self) -> Option<MetricValue> {
        let value = match self.registry.kind(self.metric)? {
            MetricKind::Counter => MetricValue::Counter(self.sum_counter_total()),
            MetricKind::Gauge => MetricValue::Gauge(self.max_gauge()),
            MetricKind::Rate => MetricValue::Rate(self.merge_rate()),
            MetricKind::Trend => MetricValue::Trend(self.trend_summary()),
        };
        Some(value)
    }
}
