//! End-to-end batch run: align, derive features, label, split, select, evaluate
//!
//! Zones are processed concurrently after the shared feature matrix is
//! built. A zone's failure is recorded under its name and never stops the
//! other zones.

use crate::align::SeriesAligner;
use crate::config::PipelineConfig;
use crate::data::{DataLoader, DataWriter, RawPriceTable, WeatherTable};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureSchema};
use crate::labels::{build_dataset, Dataset};
use crate::metrics::{EvaluationReport, Evaluator, PercentageMetric};
use crate::models::{
    ForecastModel, ForestParams, Hyperparameters, ModelFamily, Persistence, TrainedForecastModel,
    ZoneModel,
};
use crate::selection::{load_zone_grids, CandidateOutcome, ModelSelector};
use crate::serving::ModelRegistry;
use crate::split::BacktestSplitter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Everything produced for one zone that completed
#[derive(Debug, Clone)]
pub struct ZoneOutcome {
    pub model: ZoneModel,
    /// Validation error or AIC of the winner
    pub selection_score: f64,
    pub candidates: Vec<CandidateOutcome>,
    pub holdout_rows: usize,
    /// Winner on the holdout
    pub evaluation: EvaluationReport,
    /// Persistence baseline on the same holdout
    pub baseline: EvaluationReport,
}

/// Result of a pipeline run
#[derive(Debug)]
pub struct PipelineRun {
    /// Row-aligned features and labels for every aligned zone
    pub dataset: Dataset,
    pub schema: FeatureSchema,
    /// Outcome per zone, including zones that failed alignment
    pub zones: BTreeMap<String, Result<ZoneOutcome>>,
    pub family: ModelFamily,
    pub percentage_metric: PercentageMetric,
}

impl PipelineRun {
    /// Zones that completed
    pub fn succeeded(&self) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(z, _)| z.as_str())
            .collect()
    }

    /// Zones that failed, with the reason
    pub fn failed(&self) -> Vec<(&str, &ForecastError)> {
        self.zones
            .iter()
            .filter_map(|(z, r)| r.as_ref().err().map(|e| (z.as_str(), e)))
            .collect()
    }

    /// Outcome for one zone
    pub fn zone(&self, zone: &str) -> Option<&Result<ZoneOutcome>> {
        self.zones.get(zone)
    }

    /// Serving registry holding each completed zone's winner
    pub fn registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::new(self.schema.clone());
        for outcome in self.zones.values().flatten() {
            registry.insert(outcome.model.clone());
        }
        registry
    }

    /// Serializable summary
    pub fn report(&self) -> PipelineReport {
        let zones = self
            .zones
            .iter()
            .map(|(zone, result)| {
                let entry = match result {
                    Ok(outcome) => ZoneReport::Completed {
                        hyperparameters: outcome.model.hyperparameters().clone(),
                        seed: outcome.model.seed(),
                        selection_score: outcome.selection_score,
                        holdout_rows: outcome.holdout_rows,
                        evaluation: outcome.evaluation.clone(),
                        baseline: outcome.baseline.clone(),
                    },
                    Err(e) => ZoneReport::Failed {
                        error: e.to_string(),
                    },
                };
                (zone.clone(), entry)
            })
            .collect();

        PipelineReport {
            family: self.family,
            percentage_metric: self.percentage_metric,
            schema: self.schema.clone(),
            zones,
        }
    }
}

/// Contents of `report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub family: ModelFamily,
    pub percentage_metric: PercentageMetric,
    pub schema: FeatureSchema,
    pub zones: BTreeMap<String, ZoneReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZoneReport {
    Completed {
        hyperparameters: Hyperparameters,
        seed: Option<u64>,
        selection_score: f64,
        holdout_rows: usize,
        evaluation: EvaluationReport,
        baseline: EvaluationReport,
    },
    Failed {
        error: String,
    },
}

/// Batch pipeline driven by a [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    zone_grids: BTreeMap<String, Vec<ForestParams>>,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            zone_grids: BTreeMap::new(),
        })
    }

    /// Per-zone forest candidates replacing the configured grid
    pub fn with_zone_grids(mut self, grids: BTreeMap<String, Vec<ForestParams>>) -> Self {
        self.zone_grids = grids;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on in-memory tables
    pub fn run(
        &self,
        prices: &RawPriceTable,
        weather: Option<&WeatherTable>,
    ) -> Result<PipelineRun> {
        let alignment = SeriesAligner::new(self.config.alignment.negative_prices).align(prices)?;
        let table = alignment.table;
        info!(
            hours = table.len(),
            aligned = table.zone_names().len(),
            failed = alignment.failures.len(),
            "aligned price table"
        );

        let features = FeatureBuilder::new(self.config.feature_config()?)?.build(&table, weather)?;
        let zone_names = table.zone_names();
        let dataset = build_dataset(&features, &zone_names)?;
        let schema = dataset.features().schema();

        let selector = self
            .config
            .selector()
            .with_zone_grids(self.zone_grids.clone());

        let mut zones: BTreeMap<String, Result<ZoneOutcome>> = zone_names
            .par_iter()
            .map(|zone| (zone.clone(), self.run_zone(zone, &dataset, &selector)))
            .collect();
        for (zone, error) in alignment.failures {
            zones.insert(zone, Err(error));
        }

        for (zone, result) in &zones {
            match result {
                Ok(outcome) => info!(
                    zone = zone.as_str(),
                    model = %outcome.model.hyperparameters(),
                    mae = %outcome.evaluation.mae,
                    baseline_mae = %outcome.baseline.mae,
                    "zone completed"
                ),
                Err(e) => warn!(zone = zone.as_str(), error = %e, "zone failed"),
            }
        }

        Ok(PipelineRun {
            dataset,
            schema,
            zones,
            family: self.config.model.family,
            percentage_metric: self.config.backtest.percentage_metric,
        })
    }

    /// Split, select and evaluate one zone
    pub fn run_zone(
        &self,
        zone: &str,
        dataset: &Dataset,
        selector: &ModelSelector,
    ) -> Result<ZoneOutcome> {
        let splitter = BacktestSplitter::new(self.config.holdout_for(zone))?;
        let (train, test) = splitter.split(dataset)?;

        let selection = selector.select(zone, &train)?;
        let evaluator = Evaluator::new(self.config.backtest.percentage_metric);

        let frame = test.zone_frame(zone)?;
        let predictions = selection.model.predict(&frame)?;
        let evaluation = evaluator.evaluate(frame.labels(), &predictions)?;

        let baseline = Persistence::new().train(&train.zone_frame(zone)?)?;
        let baseline = evaluator.evaluate(frame.labels(), &baseline.predict(&frame)?)?;

        Ok(ZoneOutcome {
            model: selection.model,
            selection_score: selection.score,
            candidates: selection.candidates,
            holdout_rows: test.len(),
            evaluation,
            baseline,
        })
    }

    /// Load inputs named in the configuration, run, and write outputs
    pub fn run_from_files(&self) -> Result<PipelineRun> {
        let data = &self.config.data;
        let prices = DataLoader::prices_from_csv(&data.prices_path, &data.zone_prefix)?;

        let weather = match &data.weather_path {
            Some(path) => match DataLoader::weather_from_csv(path) {
                Ok(weather) => Some(weather),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "weather source unavailable");
                    None
                }
            },
            None => None,
        };

        let pipeline = match &data.grid_path {
            Some(path) => self.clone().with_zone_grids(load_zone_grids(path)?),
            None => self.clone(),
        };

        let run = pipeline.run(&prices, weather.as_ref())?;
        DataWriter::write_dataset(&run.dataset, &data.output_dir, self.config.timezone()?)?;
        write_report(&run.report(), data.output_dir.join("report.json"))?;
        Ok(run)
    }
}

/// Write a report as pretty-printed JSON
pub fn write_report<P: AsRef<Path>>(report: &PipelineReport, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    info!(path = %path.display(), "wrote report");
    Ok(())
}
