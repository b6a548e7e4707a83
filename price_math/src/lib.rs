//! # Price Math
//!
//! Numeric building blocks for hourly price series.
//! This crate knows nothing about zones, calendars or models; it provides
//! the rolling statistics, return calculations, gap filling and linear
//! algebra the forecasting pipeline is assembled from.

use thiserror::Error;

pub mod interpolation;
pub mod moving_averages;
pub mod regression;
pub mod returns;

pub use interpolation::{backward_fill, forward_fill, interpolate_linear, interpolate_time};
pub use moving_averages::{rolling_mean, SimpleMovingAverage};
pub use regression::least_squares;
pub use returns::{clip, pct_change};

/// Errors that can occur in series calculations
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for series math operations
pub type Result<T> = std::result::Result<T, MathError>;
