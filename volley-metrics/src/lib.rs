pub mod agg;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod sample;
pub mod tags;

pub use agg::Query;
pub use key::KeyId;
pub use metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, RateSummary, TrendSummary,
};
pub use registry::{MetricId, Registry};
pub use sample::{RawSample, sanitize};
pub use tags::TagSet;
