//! # Zone Forecast
//!
//! Next-hour electricity price forecasting for independent pricing zones.
//!
//! ## Features
//!
//! - Repair of gappy hourly price tables onto a common grid (time-weighted interpolation)
//! - Calendar, holiday, percent-change, rolling-mean and weather features
//! - Leakage-free next-hour labels, row-aligned with the features
//! - A fixed chronological holdout per zone
//! - Per-zone hyperparameter search for a tree ensemble or a seasonal autoregressive model
//! - Masked MAE / RMSE / MAPE or SMAPE evaluation against a persistence baseline
//!
//! ## Pipeline
//!
//! ```text
//! raw prices -> SeriesAligner -> FeatureBuilder (+ weather) -> build_dataset
//!            -> BacktestSplitter -> ModelSelector -> Evaluator -> report / ModelRegistry
//! ```
//!
//! Zones are processed concurrently; one zone failing never stops the others.
//!
//! ## Quick Start
//!
//! ```no_run
//! use zone_forecast::{Pipeline, PipelineConfig, PredictionRequest};
//!
//! # fn main() -> zone_forecast::Result<()> {
//! let config = PipelineConfig::load("forecast.toml")?;
//! let run = Pipeline::new(config)?.run_from_files()?;
//!
//! for (zone, error) in run.failed() {
//!     eprintln!("{zone}: {error}");
//! }
//!
//! let registry = run.registry();
//! let request = PredictionRequest {
//!     zone: "no1".to_string(),
//!     features: vec![0.0; registry.schema().len()],
//! };
//! let response = registry.predict(&request)?;
//! println!("{} next hour: {:.2}", response.zone, response.prediction);
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod holidays;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod selection;
pub mod serving;
pub mod split;

// Re-export commonly used types
pub use crate::align::{AlignedTable, NegativePricePolicy, SeriesAligner, ZoneSeries};
pub use crate::config::PipelineConfig;
pub use crate::data::{DataLoader, DataWriter, RawPriceTable, WeatherTable};
pub use crate::error::{ForecastError, Result};
pub use crate::features::{FeatureBuilder, FeatureConfig, FeatureMatrix, FeatureSchema};
pub use crate::holidays::HolidayCalendar;
pub use crate::labels::{build_dataset, Dataset, LabelMatrix};
pub use crate::metrics::{EvaluationReport, Evaluator, MetricValue, PercentageMetric};
pub use crate::models::{ForecastModel, ModelFamily, TrainedForecastModel, ZoneModel};
pub use crate::pipeline::{Pipeline, PipelineReport, PipelineRun};
pub use crate::selection::ModelSelector;
pub use crate::serving::{ModelRegistry, PredictionRequest, PredictionResponse};
pub use crate::split::BacktestSplitter;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
