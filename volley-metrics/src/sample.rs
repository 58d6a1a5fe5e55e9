use std::time::Duration;

/// A raw measurement as produced by a collector, before it reaches an aggregate.
///
/// Only finite numbers are meaningful; anything else coerces to zero through [`sanitize`].
pub trait RawSample {
    fn finite(&self) -> Option<f64>;
}

impl RawSample for f64 {
    fn finite(&self) -> Option<f64> {
        self.is_finite().then_some(*self)
    }
}

impl RawSample for f32 {
    fn finite(&self) -> Option<f64> {
        f64::from(*self).finite()
    }
}

impl RawSample for u64 {
    fn finite(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl RawSample for i64 {
    fn finite(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl RawSample for u32 {
    fn finite(&self) -> Option<f64> {
        Some(f64::from(*self))
    }
}

/// Durations are sampled in milliseconds.
impl RawSample for Duration {
    fn finite(&self) -> Option<f64> {
        Some(self.as_secs_f64() * 1000.0)
    }
}

impl RawSample for str {
    fn finite(&self) -> Option<f64> {
        None
    }
}

impl RawSample for String {
    fn finite(&self) -> Option<f64> {
        None
    }
}

impl<T: RawSample> RawSample for Option<T> {
    fn finite(&self) -> Option<f64> {
        self.as_ref().and_then(RawSample::finite)
    }
}

impl<T: RawSample + ?Sized> RawSample for &T {
    fn finite(&self) -> Option<f64> {
        (**self).finite()
    }
}

/// Returns `x` when it is a finite number, otherwise `0.0`.
pub fn sanitize<T: RawSample + ?Sized>(x: &T) -> f64 {
    x.finite().unwrap_or(0.0)
}
