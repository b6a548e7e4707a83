//! Loading and writing the tables the pipeline consumes and produces

use crate::error::{ForecastError, Result};
use crate::labels::Dataset;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// Raw multi-zone hourly price table, possibly gappy and unsorted
#[derive(Debug, Clone)]
pub struct RawPriceTable {
    /// Observation timestamps, one per row
    timestamps: Vec<DateTime<Utc>>,
    /// Price column per zone, `None` where the source had no value
    zones: BTreeMap<String, Vec<Option<f64>>>,
}

impl RawPriceTable {
    /// Create a table, checking every zone column matches the timestamp count
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        zones: BTreeMap<String, Vec<Option<f64>>>,
    ) -> Result<Self> {
        for (zone, values) in &zones {
            if values.len() != timestamps.len() {
                return Err(ForecastError::DataError(format!(
                    "Zone {} has {} values for {} timestamps",
                    zone,
                    values.len(),
                    timestamps.len()
                )));
            }
        }

        Ok(Self { timestamps, zones })
    }

    /// Get the timestamps
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Zone identifiers in sorted order
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Raw values for one zone
    pub fn column(&self, zone: &str) -> Option<&[Option<f64>]> {
        self.zones.get(zone).map(Vec::as_slice)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Weather observations on their own (possibly coarser) timestamp grid
#[derive(Debug, Clone)]
pub struct WeatherTable {
    timestamps: Vec<DateTime<Utc>>,
    temperature: Vec<Option<f64>>,
    wind: Vec<Option<f64>>,
}

impl WeatherTable {
    /// Create a weather table from aligned columns
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        temperature: Vec<Option<f64>>,
        wind: Vec<Option<f64>>,
    ) -> Result<Self> {
        if temperature.len() != timestamps.len() || wind.len() != timestamps.len() {
            return Err(ForecastError::DataError(format!(
                "Weather columns ({} temperature, {} wind) don't match {} timestamps",
                temperature.len(),
                wind.len(),
                timestamps.len()
            )));
        }

        Ok(Self {
            timestamps,
            temperature,
            wind,
        })
    }

    /// Get the timestamps
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Temperature readings
    pub fn temperature(&self) -> &[Option<f64>] {
        &self.temperature
    }

    /// Wind readings
    pub fn wind(&self) -> &[Option<f64>] {
        &self.wind
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Data loader for price and weather tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load the raw price table from a CSV file
    pub fn prices_from_csv<P: AsRef<Path>>(path: P, zone_prefix: &str) -> Result<RawPriceTable> {
        let df = Self::read_csv(path.as_ref())?;
        Self::prices_from_dataframe(&df, zone_prefix)
    }

    /// Build the raw price table from an existing DataFrame.
    ///
    /// Zone columns are those starting with `zone_prefix` without an
    /// underscore, so derived columns such as `NO1_pct` are skipped.
    pub fn prices_from_dataframe(df: &DataFrame, zone_prefix: &str) -> Result<RawPriceTable> {
        let time_column = Self::detect_time_column(df)?;
        let timestamps = Self::column_as_timestamps(df, &time_column)?;

        let mut zones = BTreeMap::new();
        for name in df.get_column_names() {
            if name == time_column || !name.starts_with(zone_prefix) || name.contains('_') {
                continue;
            }
            zones.insert(name.to_string(), Self::column_as_f64(df, name)?);
        }

        if zones.is_empty() {
            return Err(ForecastError::DataError(format!(
                "No zone columns with prefix '{}' found in data",
                zone_prefix
            )));
        }

        RawPriceTable::new(timestamps, zones)
    }

    /// Load a weather table from a CSV file
    pub fn weather_from_csv<P: AsRef<Path>>(path: P) -> Result<WeatherTable> {
        let df = Self::read_csv(path.as_ref())?;
        Self::weather_from_dataframe(&df)
    }

    /// Build a weather table from an existing DataFrame.
    ///
    /// Accepts `temp` and `wind_speed` as aliases for `temperature` and `wind`.
    pub fn weather_from_dataframe(df: &DataFrame) -> Result<WeatherTable> {
        let time_column = Self::detect_time_column(df)?;
        let timestamps = Self::column_as_timestamps(df, &time_column)?;

        let names = df.get_column_names();
        let find = |candidates: &[&str]| -> Result<String> {
            candidates
                .iter()
                .find(|c| names.contains(*c))
                .map(|c| c.to_string())
                .ok_or_else(|| {
                    ForecastError::DataError(format!(
                        "Weather data has none of the columns {:?}",
                        candidates
                    ))
                })
        };

        let temperature = Self::column_as_f64(df, &find(&["temperature", "temp"])?)?;
        let wind = Self::column_as_f64(df, &find(&["wind", "wind_speed"])?)?;

        WeatherTable::new(timestamps, temperature, wind)
    }

    fn read_csv(path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        info!(path = %path.display(), rows = df.height(), "loaded csv");
        Ok(df)
    }

    /// Detect the time column in a DataFrame
    fn detect_time_column(df: &DataFrame) -> Result<String> {
        let column_names = df.get_column_names();

        for name in &column_names {
            let lower_name = name.to_lowercase();
            if lower_name.contains("time") || lower_name.contains("date") {
                return Ok(name.to_string());
            }
        }

        // Fall back to an unnamed or textual index column
        if let Some(first_col) = df.get_columns().first() {
            if first_col.dtype().is_temporal() || matches!(first_col.dtype(), DataType::Utf8) {
                return Ok(first_col.name().to_string());
            }
        }

        Err(ForecastError::DataError(
            "No time column found in data".to_string(),
        ))
    }

    /// Get a column as optional f64 values, non-finite entries as missing
    fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<Option<f64>>> {
        let col = df.column(column_name).map_err(|e| {
            ForecastError::DataError(format!("Column '{}' not found: {}", column_name, e))
        })?;

        let cast = col.cast(&DataType::Float64).map_err(|e| {
            ForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64: {}",
                column_name, e
            ))
        })?;

        let values = cast
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();

        Ok(values)
    }

    /// Get a column as UTC timestamps
    fn column_as_timestamps(df: &DataFrame, column_name: &str) -> Result<Vec<DateTime<Utc>>> {
        let col = df.column(column_name)?;
        let missing = || {
            ForecastError::DataError(format!("Column '{}' has a missing timestamp", column_name))
        };

        match col.dtype() {
            DataType::Utf8 => col
                .utf8()?
                .into_iter()
                .map(|opt| opt.ok_or_else(missing).and_then(parse_timestamp))
                .collect(),
            DataType::Datetime(unit, _) => {
                let per_second: i64 = match unit {
                    TimeUnit::Nanoseconds => 1_000_000_000,
                    TimeUnit::Microseconds => 1_000_000,
                    TimeUnit::Milliseconds => 1_000,
                };
                let ints = col.cast(&DataType::Int64)?;
                let values: Result<Vec<_>> = ints
                    .i64()?
                    .into_iter()
                    .map(|opt| {
                        let raw = opt.ok_or_else(missing)?;
                        epoch_to_utc(raw.div_euclid(per_second))
                    })
                    .collect();
                values
            }
            DataType::Int64 => col
                .i64()?
                .into_iter()
                .map(|opt| opt.ok_or_else(missing).and_then(epoch_to_utc))
                .collect(),
            other => Err(ForecastError::DataError(format!(
                "Column '{}' of type {:?} cannot hold timestamps",
                column_name, other
            ))),
        }
    }
}

fn epoch_to_utc(seconds: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| ForecastError::DataError(format!("Invalid epoch timestamp {}", seconds)))
}

/// Parse a timestamp string into UTC.
///
/// Offset-carrying stamps are converted; naive stamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(ForecastError::DataError(format!(
        "Unrecognised timestamp '{}'",
        raw
    )))
}

/// Writes feature and label tables in the column order the models were trained on
#[derive(Debug)]
pub struct DataWriter;

impl DataWriter {
    /// Write `features.csv` and `labels.csv` into `dir`
    pub fn write_dataset<P: AsRef<Path>>(dataset: &Dataset, dir: P, tz: Tz) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let features = dataset.features();
        let mut feature_series = vec![Self::timestamp_series(features.timestamps(), tz)];
        for column in features.columns() {
            feature_series.push(Series::new(column.name(), column.values().to_vec()));
        }
        Self::write_frame(feature_series, &dir.join("features.csv"))?;

        let labels = dataset.labels();
        let mut label_series = vec![Self::timestamp_series(labels.timestamps(), tz)];
        for (zone, values) in labels.columns() {
            label_series.push(Series::new(&label_name(zone), values.to_vec()));
        }
        Self::write_frame(label_series, &dir.join("labels.csv"))?;

        info!(dir = %dir.display(), rows = dataset.len(), "wrote feature and label tables");
        Ok(())
    }

    fn timestamp_series(timestamps: &[DateTime<Utc>], tz: Tz) -> Series {
        let formatted: Vec<String> = timestamps
            .iter()
            .map(|t| t.with_timezone(&tz).to_rfc3339())
            .collect();
        Series::new("datetime", formatted)
    }

    fn write_frame(columns: Vec<Series>, path: &Path) -> Result<()> {
        let mut df = DataFrame::new(columns)?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
        Ok(())
    }
}

/// Column name of a zone's label
pub fn label_name(zone: &str) -> String {
    format!("{}_label", zone)
}
