use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::sample::{RawSample, sanitize};

/// Trend samples are stored with microsecond resolution; summaries are reported in ms.
const TREND_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate(RateSummary),
    Trend(TrendSummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSummary {
    pub total: u64,
    pub hits: u64,
}

impl RateSummary {
    /// `None` until at least one sample was recorded.
    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

/// Trend statistics in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub stdev: Option<f64>,
}

pub(crate) fn new_trend_histogram() -> Histogram<u64> {
    // 1us .. 1h, 3 significant digits.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn trend_percentile(h: &Histogram<u64>, percentile: f64) -> Option<f64> {
    if h.is_empty() {
        return None;
    }
    let q = (percentile / 100.0).clamp(0.0, 1.0);
    Some(h.value_at_quantile(q) as f64 / TREND_SCALE)
}

pub(crate) fn summarize_trend(h: &Histogram<u64>) -> TrendSummary {
    if h.is_empty() {
        return TrendSummary::default();
    }

    let ms = |v: u64| v as f64 / TREND_SCALE;
    TrendSummary {
        count: h.len(),
        min: Some(ms(h.min())),
        max: Some(ms(h.max())),
        avg: Some(h.mean() / TREND_SCALE),
        med: trend_percentile(h, 50.0),
        p90: trend_percentile(h, 90.0),
        p95: trend_percentile(h, 95.0),
        p99: trend_percentile(h, 99.0),
        stdev: Some(h.stdev() / TREND_SCALE),
    }
}

fn to_trend_units(ms: f64) -> u64 {
    let scaled = (ms * TREND_SCALE).round();
    if scaled <= 0.0 { 0 } else { scaled as u64 }
}

#[derive(Debug, Default)]
pub struct Rate {
    pub(crate) total: AtomicU64,
    pub(crate) hits: AtomicU64,
}

impl Rate {
    pub(crate) fn summary(&self) -> RateSummary {
        RateSummary {
            total: self.total.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => Self::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => Self::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => Self::Trend(Arc::new(Mutex::new(new_trend_histogram()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(a) => MetricHandle::Counter(a.clone()),
            Self::Gauge(a) => MetricHandle::Gauge(a.clone()),
            Self::Rate(a) => MetricHandle::Rate(a.clone()),
            Self::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            Self::Counter(c) => MetricValue::Counter(c.load(Ordering::Relaxed)),
            Self::Gauge(g) => MetricValue::Gauge(g.load(Ordering::Relaxed)),
            Self::Rate(r) => MetricValue::Rate(r.summary()),
            Self::Trend(h) => MetricValue::Trend(summarize_trend(&h.lock())),
        }
    }
}

/// Write handle for one series. Cheap to clone; writes never allocate.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    #[inline]
    pub fn add(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_gauge(&self, delta: i64) -> i64 {
        match self {
            Self::Gauge(g) => g.fetch_add(delta, Ordering::Relaxed).saturating_add(delta),
            _ => 0,
        }
    }

    /// Raises the gauge to `value` if it is currently lower.
    #[inline]
    pub fn raise_gauge(&self, value: i64) {
        if let Self::Gauge(g) = self {
            g.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let Self::Rate(r) = self {
            r.total.fetch_add(1, Ordering::Relaxed);
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a trend sample in milliseconds. Non-finite input is recorded as zero.
    #[inline]
    pub fn observe<T: RawSample + ?Sized>(&self, sample: &T) {
        if let Self::Trend(h) = self {
            let v = to_trend_units(sanitize(sample));
            h.lock().saturating_record(v);
        }
    }

    pub fn counter_value(&self) -> u64 {
        match self {
            Self::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn gauge_value(&self) -> i64 {
        match self {
            Self::Gauge(g) => g.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn rate_value(&self) -> RateSummary {
        match self {
            Self::Rate(r) => r.summary(),
            _ => RateSummary::default(),
        }
    }

    #[cfg(test)]
    fn trend_summary(&self) -> TrendSummary {
        match self {
            Self::Trend(h) => summarize_trend(&h.lock()),
            _ => TrendSummary::default(),
        }
    }
}
