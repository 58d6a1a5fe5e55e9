use std::fmt;

/// Threshold expressions attached to one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new(metric: impl Into<String>, expressions: &[&str]) -> Self {
        Self {
            metric: metric.into(),
            expressions: expressions.iter().map(|e| (*e).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl ThresholdOp {
    pub fn holds(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
            Self::Ne => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    /// Percentile in `(0, 100]`, fractional allowed (`p(99.9)`).
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in threshold: {raw}"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value in threshold: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Thresholds applied when a scenario does not configure the metric itself.
pub fn default_thresholds() -> Vec<ThresholdSet> {
    vec![
        ThresholdSet::new("http_req_duration", &["p(99)<250"]),
        ThresholdSet::new("req_fail_rate", &["rate<0.005"]),
        ThresholdSet::new("req_slow_over_threshold", &["count<1000"]),
    ]
}

/// Adds each default set whose metric is not already configured.
pub fn with_default_thresholds(mut sets: Vec<ThresholdSet>) -> Vec<ThresholdSet> {
    for default in default_thresholds() {
        if !sets.iter().any(|s| s.metric == default.metric) {
            sets.push(default);
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ThresholdExpr {
        parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse("  avg  <=  123  ");
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_supports_fractional_percentiles_med_and_not_equal() {
        assert_eq!(parse("p(99.9)<500").agg, ThresholdAgg::P(99.9));
        assert_eq!(parse("med<100").agg, ThresholdAgg::Med);
        let ne = parse("count!=0");
        assert_eq!(ne.op, ThresholdOp::Ne);
        assert!(ne.op.holds(1.0, 0.0));
    }

    #[test]
    fn parse_rejects_bad_expressions() {
        for raw in ["p(101)<1", "p(0)<1", "avg", "bogus<1", "rate<abc", "<5", ""] {
            assert!(parse_threshold_expr(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn defaults_fill_only_missing_metrics() {
        let sets = with_default_thresholds(vec![ThresholdSet::new(
            "http_req_duration",
            &["p(95)<500"],
        )]);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].expressions, vec!["p(95)<500".to_string()]);
        assert!(sets.iter().any(|s| s.metric == "req_fail_rate"));
        assert!(sets.iter().any(|s| s.metric == "req_slow_over_threshold"));
    }
}
