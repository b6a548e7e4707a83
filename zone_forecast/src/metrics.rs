//! Masked accuracy metrics for holdout evaluation
//!
//! MAE, RMSE and the percentage metric of one evaluation share a single row
//! mask. With MAPE a row is kept when its truth is present and
//! `|truth| > 1e-6`; with SMAPE only missing truth is excluded, since its
//! denominator `|truth| + |prediction| + 1e-6` never vanishes. A mask that
//! excludes every row yields [`MetricValue::Undefined`], never zero.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Truth at or below this magnitude is excluded from MAPE
pub const ZERO_TRUTH_TOLERANCE: f64 = 1e-6;

/// Added to the SMAPE denominator
pub const SMAPE_EPSILON: f64 = 1e-6;

/// Percentage error reported next to MAE and RMSE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentageMetric {
    #[default]
    Mape,
    Smape,
}

impl fmt::Display for PercentageMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentageMetric::Mape => write!(f, "MAPE"),
            PercentageMetric::Smape => write!(f, "SMAPE"),
        }
    }
}

/// Error used to rank tree ensemble candidates on the validation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMetric {
    #[default]
    Mae,
    Rmse,
}

/// A metric value, or an explicit marker that no row survived the mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    /// The value, or `UndefinedMetric` naming the metric
    pub fn value(&self, name: &str) -> Result<f64> {
        match self {
            MetricValue::Defined(v) => Ok(*v),
            MetricValue::Undefined => Err(ForecastError::UndefinedMetric(format!(
                "{} has no rows left after masking",
                name
            ))),
        }
    }

    /// The value if defined
    pub fn as_option(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    /// Check if the metric is defined
    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetricValue::Undefined, MetricValue::Defined)
    }
}

impl From<MetricValue> for Option<f64> {
    fn from(value: MetricValue) -> Self {
        value.as_option()
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Defined(v) => write!(f, "{:.4}", v),
            MetricValue::Undefined => write!(f, "undefined"),
        }
    }
}

/// Metrics for one (zone, model) evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Mean absolute error
    pub mae: MetricValue,
    /// Root mean squared error
    pub rmse: MetricValue,
    /// MAPE or SMAPE, in percent
    pub percentage: MetricValue,
    /// Which percentage metric was computed
    pub metric: PercentageMetric,
    /// Rows that survived the mask
    pub rows_used: usize,
}

impl EvaluationReport {
    /// Score used to rank candidates
    pub fn score(&self, metric: SelectionMetric) -> MetricValue {
        match metric {
            SelectionMetric::Mae => self.mae,
            SelectionMetric::Rmse => self.rmse,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast Performance Metrics:")?;
        writeln!(f, "  MAE:     {}", self.mae)?;
        writeln!(f, "  RMSE:    {}", self.rmse)?;
        writeln!(f, "  {:<6}   {}%", format!("{}:", self.metric), self.percentage)?;
        writeln!(f, "  Rows:    {}", self.rows_used)?;
        Ok(())
    }
}

/// Rows of `truth` that participate in an evaluation
pub fn evaluation_mask(truth: &[Option<f64>], metric: PercentageMetric) -> Vec<bool> {
    truth
        .iter()
        .map(|t| match t.filter(|v| v.is_finite()) {
            None => false,
            Some(v) => match metric {
                PercentageMetric::Mape => v.abs() > ZERO_TRUTH_TOLERANCE,
                PercentageMetric::Smape => true,
            },
        })
        .collect()
}

/// Computes masked metrics between holdout truth and predictions
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    metric: PercentageMetric,
}

impl Evaluator {
    /// Create an evaluator reporting the given percentage metric
    pub fn new(metric: PercentageMetric) -> Self {
        Self { metric }
    }

    /// Percentage metric in use
    pub fn metric(&self) -> PercentageMetric {
        self.metric
    }

    /// Evaluate predictions row-for-row against truth
    pub fn evaluate(&self, truth: &[Option<f64>], predictions: &[f64]) -> Result<EvaluationReport> {
        evaluate(truth, predictions, self.metric)
    }
}

/// Evaluate predictions row-for-row against truth
pub fn evaluate(
    truth: &[Option<f64>],
    predictions: &[f64],
    metric: PercentageMetric,
) -> Result<EvaluationReport> {
    if truth.len() != predictions.len() {
        return Err(ForecastError::DataError(format!(
            "Truth ({}) and predictions ({}) differ in length",
            truth.len(),
            predictions.len()
        )));
    }

    let mask = evaluation_mask(truth, metric);
    let pairs: Vec<(f64, f64)> = truth
        .iter()
        .zip(predictions)
        .zip(&mask)
        .filter(|(_, keep)| **keep)
        .filter_map(|((t, p), _)| t.map(|t| (t, *p)))
        .collect();

    if pairs.iter().any(|(_, p)| !p.is_finite()) {
        return Err(ForecastError::ForecastingError(
            "Predictions contain non-finite values".to_string(),
        ));
    }

    if pairs.is_empty() {
        return Ok(EvaluationReport {
            mae: MetricValue::Undefined,
            rmse: MetricValue::Undefined,
            percentage: MetricValue::Undefined,
            metric,
            rows_used: 0,
        });
    }

    let n = pairs.len() as f64;
    let mae = pairs.iter().map(|(t, p)| (p - t).abs()).sum::<f64>() / n;
    let mse = pairs.iter().map(|(t, p)| (p - t).powi(2)).sum::<f64>() / n;
    let percentage = match metric {
        PercentageMetric::Mape => {
            pairs.iter().map(|(t, p)| ((p - t) / t).abs()).sum::<f64>() / n * 100.0
        }
        PercentageMetric::Smape => {
            pairs
                .iter()
                .map(|(t, p)| 2.0 * (p - t).abs() / (t.abs() + p.abs() + SMAPE_EPSILON))
                .sum::<f64>()
                / n
                * 100.0
        }
    };

    Ok(EvaluationReport {
        mae: MetricValue::Defined(mae),
        rmse: MetricValue::Defined(mse.sqrt()),
        percentage: MetricValue::Defined(percentage),
        metric,
        rows_used: pairs.len(),
    })
}
