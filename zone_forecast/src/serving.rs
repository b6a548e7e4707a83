//! Serving contract: a zone name plus a feature vector in schema order

use crate::error::{ForecastError, Result};
use crate::features::FeatureSchema;
use crate::models::{Hyperparameters, ZoneModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A prediction request for one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Zone identifier, case-insensitive
    pub zone: String,
    /// One value per schema column, in schema order
    pub features: Vec<f64>,
}

/// Next-hour price prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub zone: String,
    pub prediction: f64,
    /// Hyperparameters of the model that answered
    pub model: Hyperparameters,
}

/// Trained zone models behind the feature schema they were trained on
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    schema: FeatureSchema,
    models: BTreeMap<String, ZoneModel>,
}

impl ModelRegistry {
    /// Create an empty registry for a schema
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            models: BTreeMap::new(),
        }
    }

    /// Add or replace the model for its zone
    pub fn insert(&mut self, model: ZoneModel) {
        self.models.insert(model.zone().to_uppercase(), model);
    }

    /// Feature schema every request must follow
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Zones with a model, sorted
    pub fn zones(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Model for one zone
    pub fn model(&self, zone: &str) -> Option<&ZoneModel> {
        self.models.get(&zone.trim().to_uppercase())
    }

    /// Answer a request. Unknown zones and wrong vector lengths are client
    /// errors; non-finite entries are passed to the model as missing.
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let zone = request.zone.trim().to_uppercase();
        let model = self
            .models
            .get(&zone)
            .ok_or_else(|| ForecastError::UnknownZone(request.zone.clone()))?;

        if request.features.len() != self.schema.len() {
            return Err(ForecastError::SchemaMismatch {
                expected: self.schema.len(),
                actual: request.features.len(),
            });
        }

        let row: Vec<Option<f64>> = request
            .features
            .iter()
            .map(|v| Some(*v).filter(|x| x.is_finite()))
            .collect();
        let prediction = model.predict_row(&row)?;
        debug!(zone = %zone, prediction, "served prediction");

        Ok(PredictionResponse {
            zone,
            prediction,
            model: model.hyperparameters().clone(),
        })
    }
}
