//! Ordinary least squares
//!
//! Solves the normal equations `X'X b = X'y` with Gaussian elimination and
//! partial pivoting. Rank-deficient designs are reported as errors rather
//! than regularised, so callers can treat them as a failed fit.

use crate::{MathError, Result};

/// Relative pivot size below which the system is considered singular
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Fit `targets ~ design` and return one coefficient per design column.
///
/// `design` is row-major; every row must have the same width. No intercept is
/// added; include a constant column if one is wanted.
pub fn least_squares(design: &[Vec<f64>], targets: &[f64]) -> Result<Vec<f64>> {
    if design.len() != targets.len() {
        return Err(MathError::InvalidInput(format!(
            "Design rows ({}) don't match targets ({})",
            design.len(),
            targets.len()
        )));
    }
    let width = match design.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => {
            return Err(MathError::InsufficientData(
                "Design matrix is empty".to_string(),
            ))
        }
    };
    if design.len() < width {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} rows for {} coefficients, have {}",
            width,
            width,
            design.len()
        )));
    }

    let mut gram = vec![vec![0.0; width]; width];
    let mut moment = vec![0.0; width];

    for (row, &y) in design.iter().zip(targets) {
        if row.len() != width {
            return Err(MathError::InvalidInput(
                "Design rows have inconsistent widths".to_string(),
            ));
        }
        for i in 0..width {
            moment[i] += row[i] * y;
            for j in i..width {
                gram[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..width {
        for j in 0..i {
            gram[i][j] = gram[j][i];
        }
    }

    solve(gram, moment)
}

/// Solve a dense square system in place
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);

        if a[pivot_row][col].abs() < PIVOT_TOLERANCE * scale {
            return Err(MathError::CalculationError(format!(
                "Singular system: column {} has no usable pivot",
                col
            )));
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(
            "Least squares produced non-finite coefficients".to_string(),
        ));
    }

    Ok(x)
}
