//! Error types for the zone_forecast crate

use polars::prelude::PolarsError;
use price_math::MathError;
use thiserror::Error;

/// Custom error types for the zone_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A zone has too few observations to interpolate its hourly grid
    #[error("Zone {zone}: need at least 2 valid observations to align, found {valid_points}")]
    DataInsufficient { zone: String, valid_points: usize },

    /// The requested holdout does not leave any history to train on
    #[error("Insufficient history: {rows} rows available, holdout of {holdout} requested")]
    InsufficientHistory { rows: usize, holdout: usize },

    /// Every hyperparameter candidate failed to fit
    #[error("Zone {zone}: none of {attempted} candidate configurations could be fitted")]
    NoViableModel { zone: String, attempted: usize },

    /// Feature vector does not match the trained column schema
    #[error("Schema mismatch: expected {expected} features, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// No model or column exists for the requested zone
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// Every row was masked out of a metric
    #[error("Undefined metric: {0}")]
    UndefinedMetric(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error related to fitting or forecasting
    #[error("Forecasting error: {0}")]
    ForecastingError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error in the pipeline configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from series math
    #[error("Math error: {0}")]
    MathError(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from TOML parsing
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

impl ForecastError {
    /// Errors caused by the caller's request rather than by the pipeline
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::UnknownZone(_) | ForecastError::SchemaMismatch { .. }
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
