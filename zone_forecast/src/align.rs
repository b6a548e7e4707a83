//! Series alignment: raw, gappy price records onto a common hourly grid
//!
//! Alignment runs in named steps so each can be tested on its own:
//! [`hourly_grid`] builds the grid, [`reindex`] places observations on it,
//! [`fill_gaps`] interpolates in time and fills the edges, and
//! [`apply_negative_policy`] handles negative prices.

use crate::data::RawPriceTable;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use price_math::{backward_fill, forward_fill, interpolate_time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const SECONDS_PER_HOUR: i64 = 3600;

/// What to do with negative prices after gap filling.
///
/// Negative prices are real market events in some zones; clipping treats them
/// as feed artifacts. The default keeps the historical behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePricePolicy {
    /// Replace negative prices with zero
    #[default]
    ClipToZero,
    /// Keep negative prices as observed
    Keep,
}

/// Gap-free hourly price series for one zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSeries {
    zone: String,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl ZoneSeries {
    /// Zone identifier
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Hourly timestamps, strictly increasing
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Price per hour
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of hours
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Every successfully aligned zone on the shared grid
#[derive(Debug, Clone)]
pub struct AlignedTable {
    grid: Vec<DateTime<Utc>>,
    zones: BTreeMap<String, ZoneSeries>,
}

impl AlignedTable {
    /// Shared hourly grid
    pub fn grid(&self) -> &[DateTime<Utc>] {
        &self.grid
    }

    /// Aligned zones in sorted order
    pub fn zones(&self) -> impl Iterator<Item = &ZoneSeries> {
        self.zones.values()
    }

    /// Names of the aligned zones in sorted order
    pub fn zone_names(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    /// Series for one zone
    pub fn zone(&self, zone: &str) -> Option<&ZoneSeries> {
        self.zones.get(zone)
    }

    /// Number of hours on the grid
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    /// Check if the grid is empty
    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }
}

/// Result of aligning every zone in a raw table
#[derive(Debug)]
pub struct AlignmentOutcome {
    /// Zones that aligned
    pub table: AlignedTable,
    /// Zones that could not be aligned, with the reason
    pub failures: BTreeMap<String, ForecastError>,
}

/// Repairs a raw multi-zone table into one hourly series per zone
#[derive(Debug, Clone, Default)]
pub struct SeriesAligner {
    policy: NegativePricePolicy,
}

impl SeriesAligner {
    /// Create an aligner with the given negative price policy
    pub fn new(policy: NegativePricePolicy) -> Self {
        Self { policy }
    }

    /// Align every zone onto the grid spanning the table's first and last hour.
    ///
    /// A zone that cannot be aligned is reported in `failures` and does not
    /// affect the others.
    pub fn align(&self, raw: &RawPriceTable) -> Result<AlignmentOutcome> {
        let (start, end) = match (raw.timestamps().iter().min(), raw.timestamps().iter().max()) {
            (Some(start), Some(end)) => (floor_to_hour(*start)?, floor_to_hour(*end)?),
            _ => {
                return Err(ForecastError::DataError(
                    "Price table has no rows".to_string(),
                ))
            }
        };
        let grid = hourly_grid(start, end);

        let mut zones = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for zone in raw.zones() {
            let Some(values) = raw.column(zone) else {
                continue;
            };
            match self.align_zone(zone, raw.timestamps(), values, &grid) {
                Ok(series) => {
                    zones.insert(zone.to_string(), series);
                }
                Err(e) => {
                    warn!(zone, error = %e, "zone could not be aligned");
                    failures.insert(zone.to_string(), e);
                }
            }
        }

        Ok(AlignmentOutcome {
            table: AlignedTable { grid, zones },
            failures,
        })
    }

    /// Align a single zone onto `grid`
    pub fn align_zone(
        &self,
        zone: &str,
        timestamps: &[DateTime<Utc>],
        values: &[Option<f64>],
        grid: &[DateTime<Utc>],
    ) -> Result<ZoneSeries> {
        let placed = reindex(grid, timestamps, values)?;
        let valid_points = placed.iter().filter(|v| v.is_some()).count();
        if valid_points < 2 {
            return Err(ForecastError::DataInsufficient {
                zone: zone.to_string(),
                valid_points,
            });
        }

        let filled = fill_gaps(grid, &placed)?;
        let values = apply_negative_policy(filled, self.policy);
        debug!(zone, hours = grid.len(), filled = grid.len() - valid_points, "aligned zone");

        Ok(ZoneSeries {
            zone: zone.to_string(),
            timestamps: grid.to_vec(),
            values,
        })
    }
}

/// Truncate a timestamp to the start of its hour
pub fn floor_to_hour(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(SECONDS_PER_HOUR);
    Utc.timestamp_opt(floored, 0)
        .single()
        .ok_or_else(|| ForecastError::DataError(format!("Timestamp {} out of range", ts)))
}

/// Every hour from `start` to `end`, inclusive
pub fn hourly_grid(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut grid = Vec::new();
    let mut current = start;
    while current <= end {
        grid.push(current);
        current += Duration::hours(1);
    }
    grid
}

/// Place observations on the grid by the hour they fall in.
///
/// Hours without an observation are `None`. When several observations fall
/// in the same hour, the one latest in input order wins.
pub fn reindex(
    grid: &[DateTime<Utc>],
    timestamps: &[DateTime<Utc>],
    values: &[Option<f64>],
) -> Result<Vec<Option<f64>>> {
    if timestamps.len() != values.len() {
        return Err(ForecastError::DataError(format!(
            "Timestamps ({}) and values ({}) differ in length",
            timestamps.len(),
            values.len()
        )));
    }
    let mut placed = vec![None; grid.len()];
    let Some(start) = grid.first() else {
        return Ok(placed);
    };

    for (ts, value) in timestamps.iter().zip(values) {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            continue;
        };
        let offset = (floor_to_hour(*ts)? - *start).num_hours();
        if offset >= 0 && (offset as usize) < placed.len() {
            placed[offset as usize] = Some(value);
        }
    }

    Ok(placed)
}

/// Interpolate interior gaps in time, then fill the leading and trailing edges
pub fn fill_gaps(grid: &[DateTime<Utc>], placed: &[Option<f64>]) -> Result<Vec<f64>> {
    let times: Vec<i64> = grid.iter().map(DateTime::timestamp).collect();
    let interpolated = interpolate_time(&times, placed)?;
    let filled = backward_fill(&forward_fill(&interpolated));

    filled
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| ForecastError::DataError("Gap fill left a missing value".to_string()))
        })
        .collect()
}

/// Apply the negative price policy to a filled series
pub fn apply_negative_policy(values: Vec<f64>, policy: NegativePricePolicy) -> Vec<f64> {
    match policy {
        NegativePricePolicy::ClipToZero => values.into_iter().map(|v| v.max(0.0)).collect(),
        NegativePricePolicy::Keep => values,
    }
}
