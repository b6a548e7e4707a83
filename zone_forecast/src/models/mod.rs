//! Per-zone forecasting models
//!
//! Two families are selectable: a bagged tree ensemble scored on a trailing
//! validation window, and a seasonal autoregressive model scored by AIC. The
//! families never compete with each other. A persistence baseline implements
//! the same traits as a reference.

use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

pub mod forest;
pub mod persistence;
pub mod seasonal;

pub use forest::{ForestParams, RandomForest, TrainedForest};
pub use persistence::{Persistence, TrainedPersistence};
pub use seasonal::{SeasonalArima, SeasonalOrder, TrainedSeasonal};

/// Model family chosen by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Bagged regression trees, selected on validation error
    #[default]
    Forest,
    /// Seasonal autoregressive model, selected on AIC
    Seasonal,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Forest => write!(f, "forest"),
            ModelFamily::Seasonal => write!(f, "seasonal"),
        }
    }
}

/// One zone's view of a dataset: the shared features plus that zone's labels
#[derive(Debug, Clone, Copy)]
pub struct ZoneFrame<'a> {
    zone: &'a str,
    features: &'a FeatureMatrix,
    labels: &'a [Option<f64>],
    price_column: usize,
}

impl<'a> ZoneFrame<'a> {
    /// Create a frame; `price_column` indexes the zone's own price feature
    pub fn new(
        zone: &'a str,
        features: &'a FeatureMatrix,
        labels: &'a [Option<f64>],
        price_column: usize,
    ) -> Self {
        Self {
            zone,
            features,
            labels,
            price_column,
        }
    }

    /// Zone identifier
    pub fn zone(&self) -> &'a str {
        self.zone
    }

    /// Shared feature matrix
    pub fn features(&self) -> &'a FeatureMatrix {
        self.features
    }

    /// Next-hour labels
    pub fn labels(&self) -> &'a [Option<f64>] {
        self.labels
    }

    /// Index of the zone's price in a feature row
    pub fn price_column(&self) -> usize {
        self.price_column
    }

    /// Current-hour prices of the zone
    pub fn prices(&self) -> &'a [Option<f64>] {
        self.features
            .columns()
            .get(self.price_column)
            .map(|c| c.values())
            .unwrap_or(&[])
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the frame has no rows
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Trained model able to predict the next hour from a feature row
pub trait TrainedForecastModel: Debug + Send + Sync {
    /// Predict the next-hour price for every row of the frame
    fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>>;

    /// Predict the next-hour price for a single feature row
    fn predict_row(&self, row: &[Option<f64>]) -> Result<f64>;

    /// In-sample information criterion, for families selected on one
    fn information_criterion(&self) -> Option<f64> {
        None
    }

    /// Name of the model
    fn name(&self) -> &str;
}

/// Model configuration that can be trained on a zone frame
pub trait ForecastModel: Debug + Clone + Send + Sync {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train the model on a zone frame
    fn train(&self, frame: &ZoneFrame<'_>) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;

    /// Hyperparameters of this configuration
    fn hyperparameters(&self) -> Hyperparameters;
}

/// Hyperparameters of any family, tagged by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Hyperparameters {
    /// Tree ensemble configuration
    Forest(ForestParams),
    /// Seasonal order
    Seasonal(SeasonalOrder),
    /// Persistence has nothing to tune
    Persistence,
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::Forest(p) => write!(f, "{}", p),
            Hyperparameters::Seasonal(o) => write!(f, "{}", o),
            Hyperparameters::Persistence => write!(f, "persistence"),
        }
    }
}

/// A trained model of any family
#[derive(Debug, Clone)]
pub enum FittedModel {
    Forest(TrainedForest),
    Seasonal(TrainedSeasonal),
    Persistence(TrainedPersistence),
}

impl FittedModel {
    fn inner(&self) -> &dyn TrainedForecastModel {
        match self {
            FittedModel::Forest(m) => m,
            FittedModel::Seasonal(m) => m,
            FittedModel::Persistence(m) => m,
        }
    }
}

impl TrainedForecastModel for FittedModel {
    fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>> {
        self.inner().predict(frame)
    }

    fn predict_row(&self, row: &[Option<f64>]) -> Result<f64> {
        self.inner().predict_row(row)
    }

    fn information_criterion(&self) -> Option<f64> {
        self.inner().information_criterion()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

impl From<TrainedForest> for FittedModel {
    fn from(model: TrainedForest) -> Self {
        FittedModel::Forest(model)
    }
}

impl From<TrainedSeasonal> for FittedModel {
    fn from(model: TrainedSeasonal) -> Self {
        FittedModel::Seasonal(model)
    }
}

impl From<TrainedPersistence> for FittedModel {
    fn from(model: TrainedPersistence) -> Self {
        FittedModel::Persistence(model)
    }
}

/// The surviving model for one zone, handed to serving after selection
#[derive(Debug, Clone)]
pub struct ZoneModel {
    zone: String,
    hyperparameters: Hyperparameters,
    fitted: FittedModel,
    seed: Option<u64>,
}

impl ZoneModel {
    /// Wrap a fitted model for a zone
    pub fn new(
        zone: impl Into<String>,
        hyperparameters: Hyperparameters,
        fitted: FittedModel,
        seed: Option<u64>,
    ) -> Self {
        Self {
            zone: zone.into(),
            hyperparameters,
            fitted,
            seed,
        }
    }

    /// Zone the model was trained for
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Winning hyperparameters
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Fitted model
    pub fn fitted(&self) -> &FittedModel {
        &self.fitted
    }

    /// Seed used for stochastic families
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Predict every row of a frame belonging to this zone
    pub fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>> {
        if frame.zone() != self.zone {
            return Err(ForecastError::UnknownZone(format!(
                "{} (model trained for {})",
                frame.zone(),
                self.zone
            )));
        }
        self.fitted.predict(frame)
    }

    /// Predict from a single feature row
    pub fn predict_row(&self, row: &[Option<f64>]) -> Result<f64> {
        self.fitted.predict_row(row)
    }
}
