//! # Zone Forecast Workspace
//!
//! Umbrella crate for the workspace members:
//!
//! - [`price_math`]: rolling means, returns, gap filling and least squares
//! - [`zone_forecast`]: alignment, features, labels, backtesting and per-zone
//!   model selection for next-hour electricity prices
//!
//! ```
//! use zone_forecast_workspace::price_math::rolling_mean;
//!
//! let means = rolling_mean(&[1.0, 2.0, 3.0], 2).unwrap();
//! assert_eq!(means, vec![1.0, 1.5, 2.5]);
//! ```

pub use price_math;
pub use zone_forecast;

/// Version of the workspace crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
