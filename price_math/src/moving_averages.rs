//! Trailing moving averages
//!
//! The averages here follow a `min_periods = 1` convention: until a full
//! window has been observed, the mean is taken over however many values are
//! available. Early rows get a noisier average instead of a missing value.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Streaming Simple Moving Average over a trailing window
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Push a new observation, evicting the oldest once the window is full
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Moving average input must be finite, got {}",
                value
            )));
        }

        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }

        Ok(())
    }

    /// Mean of the values currently in the window
    pub fn value(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(MathError::InsufficientData(
                "No values observed yet".to_string(),
            ));
        }

        Ok(self.sum / self.values.len() as f64)
    }

    /// Whether a full window has been observed
    pub fn is_warm(&self) -> bool {
        self.values.len() == self.period
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the SMA, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Trailing mean over `window` rows with a minimum of one observation.
///
/// Output has the same length as the input and is defined from the first row
/// onward. Every input value must be finite.
pub fn rolling_mean(values: &[f64], window: usize) -> Result<Vec<f64>> {
    let mut sma = SimpleMovingAverage::new(window)?;
    let mut out = Vec::with_capacity(values.len());

    for &value in values {
        sma.update(value)?;
        out.push(sma.value()?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_partial_window() {
        let mut sma = SimpleMovingAverage::new(3).unwrap();

        assert!(sma.value().is_err());

        sma.update(2.0).unwrap();
        assert_eq!(sma.value().unwrap(), 2.0);
        assert!(!sma.is_warm());

        sma.update(4.0).unwrap();
        assert_eq!(sma.value().unwrap(), 3.0);

        sma.update(6.0).unwrap();
        assert!(sma.is_warm());
        assert_eq!(sma.value().unwrap(), 4.0);

        // The window slides, dropping the oldest value
        sma.update(8.0).unwrap();
        assert_eq!(sma.value().unwrap(), 6.0);
    }

    #[test]
    fn test_sma_rejects_non_finite() {
        let mut sma = SimpleMovingAverage::new(2).unwrap();
        assert!(sma.update(f64::NAN).is_err());
        assert!(sma.update(f64::INFINITY).is_err());
        assert!(SimpleMovingAverage::new(0).is_err());
    }

    #[test]
    fn test_rolling_mean_defined_from_first_row() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let means = rolling_mean(&values, 3).unwrap();

        assert_eq!(means.len(), values.len());
        assert_relative_eq!(means[0], 1.0);
        assert_relative_eq!(means[1], 1.5);
        assert_relative_eq!(means[2], 2.0);
        assert_relative_eq!(means[3], 3.0);
        assert_relative_eq!(means[4], 4.0);
    }

    #[test]
    fn test_rolling_mean_window_longer_than_series() {
        let means = rolling_mean(&[10.0, 20.0], 24).unwrap();
        assert_eq!(means, vec![10.0, 15.0]);
        assert!(rolling_mean(&[], 3).unwrap().is_empty());
    }
}
