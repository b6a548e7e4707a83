//! Chronological train/holdout split

use crate::error::{ForecastError, Result};
use crate::labels::Dataset;

/// 30 days of hourly rows
pub const DEFAULT_HOLDOUT_HOURS: usize = 30 * 24;

/// Single fixed split: the trailing rows are the holdout, everything before
/// is train. No shuffling, no overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktestSplitter {
    holdout: usize,
}

impl Default for BacktestSplitter {
    fn default() -> Self {
        Self {
            holdout: DEFAULT_HOLDOUT_HOURS,
        }
    }
}

impl BacktestSplitter {
    /// Create a splitter with the given holdout length in rows
    pub fn new(holdout: usize) -> Result<Self> {
        if holdout == 0 {
            return Err(ForecastError::InvalidParameter(
                "Holdout length must be positive".to_string(),
            ));
        }
        Ok(Self { holdout })
    }

    /// Holdout length in rows
    pub fn holdout(&self) -> usize {
        self.holdout
    }

    /// Split into `(train, test)`; needs strictly more rows than the holdout
    pub fn split(&self, dataset: &Dataset) -> Result<(Dataset, Dataset)> {
        let rows = dataset.len();
        if rows <= self.holdout {
            return Err(ForecastError::InsufficientHistory {
                rows,
                holdout: self.holdout,
            });
        }

        let boundary = rows - self.holdout;
        Ok((dataset.slice(0..boundary)?, dataset.slice(boundary..rows)?))
    }
}
