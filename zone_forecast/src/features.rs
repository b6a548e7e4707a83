//! Feature engineering on the aligned hourly grid
//!
//! Column order is part of the contract with the serving side: zone prices,
//! calendar columns, per-zone percent changes, per-zone rolling means, the
//! holiday flag, then weather columns when a weather table was joined.

use crate::align::AlignedTable;
use crate::data::WeatherTable;
use crate::error::{ForecastError, Result};
use crate::holidays::HolidayCalendar;
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use price_math::{
    backward_fill, clip, forward_fill, interpolate_linear, pct_change, rolling_mean,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tracing::{info, warn};

/// Settings for feature derivation
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Trailing windows in hours for rolling means
    pub windows: Vec<usize>,
    /// Symmetric bound on percent-change values
    pub pct_cap: f64,
    /// Civil timezone for calendar and holiday features
    pub timezone: Tz,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows: vec![3, 6, 24],
            pct_cap: 100.0,
            timezone: chrono_tz::Europe::Oslo,
        }
    }
}

/// One named feature column. Missing values are `None`; non-finite input is
/// stored as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    name: String,
    values: Vec<Option<f64>>,
}

impl FeatureColumn {
    /// Create a column, converting non-finite values to missing
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect(),
        }
    }

    /// Create a fully populated column
    pub fn dense(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, values.into_iter().map(Some).collect())
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column values
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Whether every value is present
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// Ordered column names a feature vector must follow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema from column names
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Feature table keyed by hourly timestamps in chronological order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<FeatureColumn>,
}

impl FeatureMatrix {
    /// Create a matrix, checking column lengths and name uniqueness
    pub fn new(timestamps: Vec<DateTime<Utc>>, columns: Vec<FeatureColumn>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != timestamps.len() {
                return Err(ForecastError::DataError(format!(
                    "Column '{}' has {} values for {} rows",
                    column.name,
                    column.values.len(),
                    timestamps.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ForecastError::DataError(format!(
                    "Duplicate feature column '{}'",
                    column.name
                )));
            }
        }
        if timestamps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ForecastError::DataError(
                "Feature timestamps must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            timestamps,
            columns,
        })
    }

    /// Row timestamps
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Columns in schema order
    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in order
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.columns.iter().map(|c| c.name.clone()).collect())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the matrix has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// One row across all columns
    pub fn row(&self, index: usize) -> Option<Vec<Option<f64>>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[index]).collect())
    }

    /// Contiguous rows, preserving column order
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(ForecastError::DataError(format!(
                "Row range {:?} out of bounds for {} rows",
                range,
                self.len()
            )));
        }

        Ok(Self {
            timestamps: self.timestamps[range.clone()].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    values: c.values[range.clone()].to_vec(),
                })
                .collect(),
        })
    }
}

/// Derives the feature matrix from aligned prices and optional weather
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    calendar: HolidayCalendar,
}

impl FeatureBuilder {
    /// Create a builder, rejecting empty or zero windows and non-positive caps
    pub fn new(config: FeatureConfig) -> Result<Self> {
        if config.windows.is_empty() || config.windows.contains(&0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Rolling windows must be non-empty and positive, got {:?}",
                config.windows
            )));
        }
        if !(config.pct_cap > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Percent-change cap must be positive, got {}",
                config.pct_cap
            )));
        }

        Ok(Self {
            config,
            calendar: HolidayCalendar::new(),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Build the feature matrix.
    ///
    /// Weather is optional; when absent, or when none of its timestamps land
    /// on the grid, the weather columns are skipped with a warning.
    pub fn build(
        &self,
        aligned: &AlignedTable,
        weather: Option<&WeatherTable>,
    ) -> Result<FeatureMatrix> {
        let grid = aligned.grid();
        let mut columns = Vec::new();

        for series in aligned.zones() {
            columns.push(FeatureColumn::dense(series.zone(), series.values().to_vec()));
        }

        columns.extend(calendar_columns(grid, self.config.timezone));

        for series in aligned.zones() {
            columns.push(pct_change_column(
                series.zone(),
                series.values(),
                self.config.pct_cap,
            ));
        }

        for series in aligned.zones() {
            columns.extend(rolling_mean_columns(
                series.zone(),
                series.values(),
                &self.config.windows,
            )?);
        }

        columns.push(holiday_column(grid, self.config.timezone, &self.calendar));

        match weather {
            Some(weather) => match weather_columns(grid, weather, &self.config.windows)? {
                Some(weather_cols) => columns.extend(weather_cols),
                None => warn!(
                    "weather table has no timestamps on the price grid, skipping weather features"
                ),
            },
            None => warn!("no weather source, skipping weather features"),
        }

        let matrix = FeatureMatrix::new(grid.to_vec(), columns)?;
        info!(rows = matrix.len(), columns = matrix.width(), "built feature matrix");
        Ok(matrix)
    }
}

/// Hour of day, day of week (Monday = 0) and weekend flag in civil time
pub fn calendar_columns(grid: &[DateTime<Utc>], tz: Tz) -> Vec<FeatureColumn> {
    let local: Vec<_> = grid.iter().map(|t| t.with_timezone(&tz)).collect();

    let hour = local.iter().map(|t| t.hour() as f64).collect();
    let weekday: Vec<f64> = local
        .iter()
        .map(|t| t.weekday().num_days_from_monday() as f64)
        .collect();
    let weekend = weekday
        .iter()
        .map(|&d| if d >= 5.0 { 1.0 } else { 0.0 })
        .collect();

    vec![
        FeatureColumn::dense("hour", hour),
        FeatureColumn::dense("weekday", weekday),
        FeatureColumn::dense("is_weekend", weekend),
    ]
}

/// Hour-over-hour change of the aligned price, non-finite as missing, then
/// clipped to `[-cap, cap]`
pub fn pct_change_column(zone: &str, prices: &[f64], cap: f64) -> FeatureColumn {
    let present: Vec<Option<f64>> = prices.iter().map(|&p| Some(p)).collect();
    let changes = clip(&pct_change(&present), cap);
    FeatureColumn::new(format!("{}_pct_hourly", zone), changes)
}

/// One trailing mean column per window, named `{prefix}_ma_{w}h`
pub fn rolling_mean_columns(
    prefix: &str,
    values: &[f64],
    windows: &[usize],
) -> Result<Vec<FeatureColumn>> {
    windows
        .iter()
        .map(|&w| {
            let means = rolling_mean(values, w)?;
            Ok(FeatureColumn::dense(format!("{}_ma_{}h", prefix, w), means))
        })
        .collect()
}

/// 1 on observed holidays (civil date), 0 otherwise
pub fn holiday_column(grid: &[DateTime<Utc>], tz: Tz, calendar: &HolidayCalendar) -> FeatureColumn {
    let dates: Vec<_> = grid.iter().map(|t| t.with_timezone(&tz).date_naive()).collect();
    let holidays = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => calendar.holidays_between(first, last),
        _ => Default::default(),
    };

    let flags = dates
        .iter()
        .map(|d| if holidays.contains(d) { 1.0 } else { 0.0 })
        .collect();
    FeatureColumn::dense("is_holiday", flags)
}

/// Left-join weather onto the grid and derive its rolling means.
///
/// Returns `None` when no weather timestamp matches a grid hour.
pub fn weather_columns(
    grid: &[DateTime<Utc>],
    weather: &WeatherTable,
    windows: &[usize],
) -> Result<Option<Vec<FeatureColumn>>> {
    let positions: HashMap<DateTime<Utc>, usize> =
        grid.iter().enumerate().map(|(i, t)| (*t, i)).collect();

    let mut temperature = vec![None; grid.len()];
    let mut wind = vec![None; grid.len()];
    let mut matched = 0;
    for (i, ts) in weather.timestamps().iter().enumerate() {
        if let Some(&pos) = positions.get(ts) {
            temperature[pos] = weather.temperature()[i];
            wind[pos] = weather.wind()[i];
            matched += 1;
        }
    }
    if matched == 0 {
        return Ok(None);
    }

    let temperature = fill_weather(&temperature);
    let wind = fill_weather(&wind);
    let (Some(temperature), Some(wind)) = (temperature, wind) else {
        return Ok(None);
    };

    let mut columns = vec![
        FeatureColumn::dense("temperature", temperature.clone()),
        FeatureColumn::dense("wind", wind.clone()),
    ];
    for &w in windows {
        columns.push(FeatureColumn::dense(
            format!("temp_ma_{}h", w),
            rolling_mean(&temperature, w)?,
        ));
        columns.push(FeatureColumn::dense(
            format!("wind_ma_{}h", w),
            rolling_mean(&wind, w)?,
        ));
    }

    Ok(Some(columns))
}

/// Linear interpolation, then forward fill, then backward fill.
/// `None` if the column had no value at all.
fn fill_weather(values: &[Option<f64>]) -> Option<Vec<f64>> {
    backward_fill(&forward_fill(&interpolate_linear(values)))
        .into_iter()
        .collect()
}
