//! Persistence baseline: the next hour costs what this hour costs

use crate::error::{ForecastError, Result};
use crate::models::{ForecastModel, Hyperparameters, TrainedForecastModel, ZoneFrame};

/// Untrained persistence model
#[derive(Debug, Clone, Default)]
pub struct Persistence;

impl Persistence {
    /// Create the baseline
    pub fn new() -> Self {
        Self
    }
}

impl ForecastModel for Persistence {
    type Trained = TrainedPersistence;

    fn train(&self, frame: &ZoneFrame<'_>) -> Result<TrainedPersistence> {
        Ok(TrainedPersistence {
            width: frame.features().width(),
            price_column: frame.price_column(),
        })
    }

    fn name(&self) -> &str {
        "Persistence"
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Persistence
    }
}

/// Persistence bound to the position of the zone's price column
#[derive(Debug, Clone)]
pub struct TrainedPersistence {
    width: usize,
    price_column: usize,
}

impl TrainedForecastModel for TrainedPersistence {
    fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>> {
        frame
            .prices()
            .iter()
            .map(|p| {
                p.ok_or_else(|| {
                    ForecastError::ForecastingError("Missing price in forecast frame".to_string())
                })
            })
            .collect()
    }

    fn predict_row(&self, row: &[Option<f64>]) -> Result<f64> {
        if row.len() != self.width {
            return Err(ForecastError::SchemaMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        row[self.price_column]
            .ok_or_else(|| ForecastError::ForecastingError("Row has no current price".to_string()))
    }

    fn name(&self) -> &str {
        "Persistence"
    }
}
