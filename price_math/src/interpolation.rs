//! Gap filling for regularly or irregularly spaced series
//!
//! Interpolation only fills interior gaps, i.e. missing values with a known
//! neighbour on both sides. Leading and trailing gaps are left for
//! [`forward_fill`] and [`backward_fill`].

use crate::{MathError, Result};

/// Fill interior gaps by linear interpolation weighted by elapsed time.
///
/// `times` must be strictly increasing and the same length as `values`.
/// A three-hour gap between 10 and 40 becomes 17.5, 25, 32.5 rather than a
/// flat line.
pub fn interpolate_time(times: &[i64], values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    if times.len() != values.len() {
        return Err(MathError::InvalidInput(format!(
            "Times length ({}) doesn't match values length ({})",
            times.len(),
            values.len()
        )));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(MathError::InvalidInput(
            "Times must be strictly increasing".to_string(),
        ));
    }

    Ok(fill_between(values, |left, right, i| {
        let span = (times[right] - times[left]) as f64;
        (times[i] - times[left]) as f64 / span
    }))
}

/// Fill interior gaps by linear interpolation over row position
pub fn interpolate_linear(values: &[Option<f64>]) -> Vec<Option<f64>> {
    fill_between(values, |left, right, i| {
        (i - left) as f64 / (right - left) as f64
    })
}

/// Walk known anchors pairwise and fill the gap between them
fn fill_between<F>(values: &[Option<f64>], weight: F) -> Vec<Option<f64>>
where
    F: Fn(usize, usize, usize) -> f64,
{
    let mut out: Vec<Option<f64>> = values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();

    let anchors: Vec<usize> = out
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();

    for pair in anchors.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if right - left < 2 {
            continue;
        }
        let (Some(lv), Some(rv)) = (out[left], out[right]) else {
            continue;
        };
        for i in left + 1..right {
            let w = weight(left, right, i);
            out[i] = Some(lv + (rv - lv) * w);
        }
    }

    out
}

/// Carry the last known value forward over missing entries
pub fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last = None;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v.filter(|x| x.is_finite()) {
                last = Some(x);
            }
            last
        })
        .collect()
}

/// Carry the next known value backward over missing entries
pub fn backward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut next = None;
    let mut out: Vec<Option<f64>> = values
        .iter()
        .rev()
        .map(|v| {
            if let Some(x) = v.filter(|x| x.is_finite()) {
                next = Some(x);
            }
            next
        })
        .collect();
    out.reverse();
    out
}
