//! Hour-over-hour returns

/// Fractional change `(x[t] - x[t-1]) / x[t-1]`.
///
/// The first element has no predecessor and is `None`. Any non-finite result
/// (a zero or missing denominator, or a missing operand) is `None` too; it is
/// never replaced with zero.
pub fn pct_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }

    out.push(None);
    for pair in values.windows(2) {
        let change = match (pair[0], pair[1]) {
            (Some(prev), Some(curr)) => Some((curr - prev) / prev),
            _ => None,
        };
        out.push(change.filter(|c| c.is_finite()));
    }

    out
}

/// Clip present values into `[-cap, cap]`, leaving missing values alone
pub fn clip(values: &[Option<f64>], cap: f64) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| v.map(|x| x.clamp(-cap, cap)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_change_basic() {
        let values = [Some(100.0), Some(110.0), Some(99.0)];
        let changes = pct_change(&values);

        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], None);
        assert!((changes[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((changes[2].unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_pct_change_zero_denominator_is_missing() {
        // 0 -> 5 is +inf, 0 -> 0 is NaN; both become missing
        let values = [Some(0.0), Some(5.0), Some(0.0), Some(0.0)];
        let changes = pct_change(&values);

        assert_eq!(changes[1], None);
        assert_eq!(changes[2], Some(-1.0));
        assert_eq!(changes[3], None);
    }

    #[test]
    fn test_clip_keeps_missing() {
        let clipped = clip(&[Some(250.0), None, Some(-1000.0), Some(0.5)], 100.0);
        assert_eq!(clipped, vec![Some(100.0), None, Some(-100.0), Some(0.5)]);
    }
}
