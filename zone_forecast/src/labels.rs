//! Next-hour labels and the row-aligned feature/label dataset
//!
//! Leakage prevention lives in two steps: [`shift_next_hour`] moves each
//! price one row back, and [`drop_unlabelled_tail`] removes the final row of
//! the feature matrix, which has no next hour. [`build_dataset`] is the only
//! place that combines them, and [`Dataset::new`] rejects anything that is not
//! row-for-row aligned.

use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use crate::models::ZoneFrame;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Range;

/// Next-hour price per zone, keyed by the timestamp of the feature row
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatrix {
    timestamps: Vec<DateTime<Utc>>,
    zones: BTreeMap<String, Vec<Option<f64>>>,
}

impl LabelMatrix {
    /// Create a label matrix, checking every zone column length
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        zones: BTreeMap<String, Vec<Option<f64>>>,
    ) -> Result<Self> {
        for (zone, values) in &zones {
            if values.len() != timestamps.len() {
                return Err(ForecastError::DataError(format!(
                    "Label column '{}' has {} values for {} rows",
                    zone,
                    values.len(),
                    timestamps.len()
                )));
            }
        }
        Ok(Self { timestamps, zones })
    }

    /// Row timestamps
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Zone columns in sorted order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.zones.iter().map(|(z, v)| (z.as_str(), v.as_slice()))
    }

    /// Label column for one zone
    pub fn zone(&self, zone: &str) -> Option<&[Option<f64>]> {
        self.zones.get(zone).map(Vec::as_slice)
    }

    /// Zones with a label column
    pub fn zone_names(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            timestamps: self.timestamps[range.clone()].to_vec(),
            zones: self
                .zones
                .iter()
                .map(|(z, v)| (z.clone(), v[range.clone()].to_vec()))
                .collect(),
        }
    }
}

/// Row-aligned features and labels
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: FeatureMatrix,
    labels: LabelMatrix,
}

impl Dataset {
    /// Pair features with labels; both must share every timestamp in order
    pub fn new(features: FeatureMatrix, labels: LabelMatrix) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(ForecastError::DataError(format!(
                "Feature rows ({}) and label rows ({}) differ",
                features.len(),
                labels.len()
            )));
        }
        if features.timestamps() != labels.timestamps() {
            return Err(ForecastError::DataError(
                "Feature and label timestamps are not row-aligned".to_string(),
            ));
        }
        Ok(Self { features, labels })
    }

    /// Feature matrix
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Label matrix
    pub fn labels(&self) -> &LabelMatrix {
        &self.labels
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Contiguous rows of both tables
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        let features = self.features.slice(range.clone())?;
        let labels = self.labels.slice(range);
        Ok(Self { features, labels })
    }

    /// View of the dataset for one zone's model
    pub fn zone_frame<'a>(&'a self, zone: &'a str) -> Result<ZoneFrame<'a>> {
        let labels = self
            .labels
            .zone(zone)
            .ok_or_else(|| ForecastError::UnknownZone(zone.to_string()))?;
        let price_column = self
            .features
            .column_index(zone)
            .ok_or_else(|| ForecastError::UnknownZone(zone.to_string()))?;

        Ok(ZoneFrame::new(zone, &self.features, labels, price_column))
    }
}

/// Label at row `t` is the value at row `t + 1`; the last row has none
pub fn shift_next_hour(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut shifted: Vec<Option<f64>> = prices.iter().skip(1).copied().collect();
    if !prices.is_empty() {
        shifted.push(None);
    }
    shifted
}

/// Drop the final feature row, which has no next-hour label
pub fn drop_unlabelled_tail(features: &FeatureMatrix) -> Result<FeatureMatrix> {
    let n = features.len();
    if n < 2 {
        return Err(ForecastError::InsufficientHistory { rows: n, holdout: 0 });
    }
    features.slice(0..n - 1)
}

/// Shift each zone's price column and drop the unlabelled tail from both sides
pub fn build_dataset(features: &FeatureMatrix, zones: &[String]) -> Result<Dataset> {
    let trimmed = drop_unlabelled_tail(features)?;
    let rows = trimmed.len();

    let mut labels = BTreeMap::new();
    for zone in zones {
        let prices = features
            .column(zone)
            .ok_or_else(|| ForecastError::UnknownZone(zone.clone()))?;
        let mut shifted = shift_next_hour(prices.values());
        shifted.truncate(rows);
        labels.insert(zone.clone(), shifted);
    }

    let labels = LabelMatrix::new(trimmed.timestamps().to_vec(), labels)?;
    Dataset::new(trimmed, labels)
}
