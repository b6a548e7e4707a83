//! Pipeline configuration loaded from TOML
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration.

use crate::align::NegativePricePolicy;
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::metrics::{PercentageMetric, SelectionMetric};
use crate::models::ModelFamily;
use crate::selection::{ForestGrid, ModelSelector, SeasonalGrid};
use crate::split::DEFAULT_HOLDOUT_HOURS;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub alignment: AlignmentSettings,
    #[serde(default)]
    pub features: FeatureSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub model: ModelSettings,
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Multi-zone hourly price CSV
    pub prices_path: PathBuf,
    /// Optional weather CSV
    pub weather_path: Option<PathBuf>,
    /// Optional per-zone hyperparameter CSV for the tree ensemble
    pub grid_path: Option<PathBuf>,
    /// Directory for features.csv, labels.csv and report.json
    pub output_dir: PathBuf,
    /// Prefix identifying zone columns in the price table
    pub zone_prefix: String,
    /// IANA name of the civil timezone
    pub timezone: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            prices_path: PathBuf::from("data/raw/prices.csv"),
            weather_path: None,
            grid_path: None,
            output_dir: PathBuf::from("data/processed"),
            zone_prefix: "NO".to_string(),
            timezone: "Europe/Oslo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    pub negative_prices: NegativePricePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// Rolling-mean windows in hours
    pub windows: Vec<usize>,
    /// Symmetric percent-change cap
    pub pct_cap: f64,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            windows: vec![3, 6, 24],
            pct_cap: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Holdout length in hours
    pub holdout_hours: usize,
    /// Holdout length per zone, replacing `holdout_hours` for that zone
    pub holdout_overrides: BTreeMap<String, usize>,
    pub percentage_metric: PercentageMetric,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            holdout_hours: DEFAULT_HOLDOUT_HOURS,
            holdout_overrides: BTreeMap::new(),
            percentage_metric: PercentageMetric::Mape,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub family: ModelFamily,
    pub seed: u64,
    /// Trailing train hours that score tree ensemble candidates
    pub validation_hours: usize,
    pub selection_metric: SelectionMetric,
    pub feature_fraction: f64,
    pub forest_grid: ForestGrid,
    pub seasonal_grid: SeasonalGrid,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            family: ModelFamily::Forest,
            seed: 42,
            validation_hours: 168,
            selection_metric: SelectionMetric::Mae,
            feature_fraction: 1.0,
            forest_grid: ForestGrid::default(),
            seasonal_grid: SeasonalGrid::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;

        if self.data.zone_prefix.is_empty() {
            return Err(ForecastError::ConfigError(
                "data.zone_prefix must not be empty".to_string(),
            ));
        }
        if self.features.windows.is_empty() || self.features.windows.contains(&0) {
            return Err(ForecastError::ConfigError(format!(
                "features.windows must be non-empty and positive, got {:?}",
                self.features.windows
            )));
        }
        if !(self.features.pct_cap > 0.0) {
            return Err(ForecastError::ConfigError(format!(
                "features.pct_cap must be positive, got {}",
                self.features.pct_cap
            )));
        }
        if self.backtest.holdout_hours == 0 {
            return Err(ForecastError::ConfigError(
                "backtest.holdout_hours must be positive".to_string(),
            ));
        }
        if let Some((zone, _)) = self.backtest.holdout_overrides.iter().find(|(_, h)| **h == 0) {
            return Err(ForecastError::ConfigError(format!(
                "backtest.holdout_overrides.{} must be positive",
                zone
            )));
        }
        if !(self.model.feature_fraction > 0.0 && self.model.feature_fraction <= 1.0) {
            return Err(ForecastError::ConfigError(format!(
                "model.feature_fraction must be in (0, 1], got {}",
                self.model.feature_fraction
            )));
        }
        if self.model.family == ModelFamily::Forest && self.model.validation_hours == 0 {
            return Err(ForecastError::ConfigError(
                "model.validation_hours must be positive for the forest family".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed civil timezone
    pub fn timezone(&self) -> Result<Tz> {
        self.data.timezone.parse::<Tz>().map_err(|_| {
            ForecastError::ConfigError(format!("Unknown timezone '{}'", self.data.timezone))
        })
    }

    /// Holdout length for one zone
    pub fn holdout_for(&self, zone: &str) -> usize {
        self.backtest
            .holdout_overrides
            .get(zone)
            .copied()
            .unwrap_or(self.backtest.holdout_hours)
    }

    /// Feature derivation settings
    pub fn feature_config(&self) -> Result<FeatureConfig> {
        Ok(FeatureConfig {
            windows: self.features.windows.clone(),
            pct_cap: self.features.pct_cap,
            timezone: self.timezone()?,
        })
    }

    /// Model selector for the configured family
    pub fn selector(&self) -> ModelSelector {
        ModelSelector::new(self.model.family)
            .with_seed(self.model.seed)
            .with_validation_hours(self.model.validation_hours)
            .with_selection_metric(self.model.selection_metric)
            .with_percentage_metric(self.backtest.percentage_metric)
            .with_feature_fraction(self.model.feature_fraction)
            .with_forest_grid(self.model.forest_grid.clone())
            .with_seasonal_grid(self.model.seasonal_grid.clone())
    }
}
