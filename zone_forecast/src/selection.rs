//! Per-zone hyperparameter search
//!
//! Candidates are fitted concurrently and reduced to the one with the lowest
//! score, ties going to the earliest candidate in enumeration order. The
//! reduction only compares `(score, index)` pairs, so the outcome does not
//! depend on how rayon schedules the work. A candidate that fails to fit is
//! logged and skipped; the zone only fails when every candidate does.

use crate::error::{ForecastError, Result};
use crate::labels::Dataset;
use crate::metrics::{evaluate, PercentageMetric, SelectionMetric};
use crate::models::{
    FittedModel, ForecastModel, ForestParams, Hyperparameters, ModelFamily, RandomForest,
    SeasonalArima, SeasonalOrder, TrainedForecastModel, ZoneModel,
};
use csv::ReaderBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Candidate axes for the tree ensemble, enumerated as
/// `n_estimators` x `max_depth` x `min_samples_leaf` (last axis fastest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestGrid {
    pub n_estimators: Vec<usize>,
    /// Bounded depths to try
    pub max_depth: Vec<usize>,
    /// Also try unbounded depth, after the bounded ones
    pub unbounded_depth: bool,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100],
            max_depth: vec![10],
            unbounded_depth: true,
            min_samples_leaf: vec![1, 5],
        }
    }
}

impl ForestGrid {
    /// Every configuration in enumeration order
    pub fn candidates(&self) -> Vec<ForestParams> {
        let depths: Vec<Option<usize>> = self
            .max_depth
            .iter()
            .map(|&d| Some(d))
            .chain(self.unbounded_depth.then_some(None))
            .collect();

        let mut out = Vec::new();
        for &n in &self.n_estimators {
            for &depth in &depths {
                for &leaf in &self.min_samples_leaf {
                    out.push(ForestParams::new(n, depth, leaf));
                }
            }
        }
        out
    }
}

/// Candidate axes for the seasonal model, enumerated as
/// `p, d, q, P, D, Q` (last axis fastest) with a fixed period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalGrid {
    pub p: Vec<usize>,
    pub d: Vec<usize>,
    pub q: Vec<usize>,
    pub seasonal_p: Vec<usize>,
    pub seasonal_d: Vec<usize>,
    pub seasonal_q: Vec<usize>,
    pub period: usize,
}

impl Default for SeasonalGrid {
    fn default() -> Self {
        Self {
            p: vec![0, 1, 2],
            d: vec![0, 1],
            q: vec![0, 1, 2],
            seasonal_p: vec![0, 1],
            seasonal_d: vec![1],
            seasonal_q: vec![0, 1],
            period: 24,
        }
    }
}

impl SeasonalGrid {
    /// Every order in enumeration order
    pub fn candidates(&self) -> Vec<SeasonalOrder> {
        let mut out = Vec::new();
        for &p in &self.p {
            for &d in &self.d {
                for &q in &self.q {
                    for &sp in &self.seasonal_p {
                        for &sd in &self.seasonal_d {
                            for &sq in &self.seasonal_q {
                                out.push(SeasonalOrder::new((p, d, q), (sp, sd, sq, self.period)));
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct GridRow {
    zone: String,
    n_estimators: f64,
    max_depth: Option<f64>,
    min_samples_leaf: f64,
}

/// Read per-zone tree ensemble candidates from a CSV with columns
/// `zone,n_estimators,max_depth,min_samples_leaf`.
///
/// An empty `max_depth` means unbounded. Rows keep file order within a zone.
pub fn load_zone_grids<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, Vec<ForestParams>>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut grids: BTreeMap<String, Vec<ForestParams>> = BTreeMap::new();
    for (line, result) in reader.deserialize().enumerate() {
        let row: GridRow = result?;
        let params = ForestParams::new(
            whole_number(row.n_estimators, "n_estimators", line)?,
            row.max_depth
                .filter(|d| !d.is_nan())
                .map(|d| whole_number(d, "max_depth", line))
                .transpose()?,
            whole_number(row.min_samples_leaf, "min_samples_leaf", line)?,
        );
        params.validate()?;
        grids
            .entry(row.zone.trim().to_uppercase())
            .or_default()
            .push(params);
    }

    info!(path = %path.display(), zones = grids.len(), "loaded hyperparameter grid");
    Ok(grids)
}

fn whole_number(value: f64, field: &str, line: usize) -> Result<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(ForecastError::InvalidParameter(format!(
            "Grid row {}: {} must be a non-negative integer, got {}",
            line + 1,
            field,
            value
        )))
    }
}

/// Score of one candidate, or why it was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub hyperparameters: Hyperparameters,
    pub score: Option<f64>,
    pub error: Option<String>,
}

/// Winning model for one zone with every candidate's outcome
#[derive(Debug, Clone)]
pub struct ZoneSelection {
    pub model: ZoneModel,
    /// Winning validation error or AIC
    pub score: f64,
    pub candidates: Vec<CandidateOutcome>,
}

/// Searches a candidate grid per zone on the train segment only
#[derive(Debug, Clone)]
pub struct ModelSelector {
    family: ModelFamily,
    seed: u64,
    validation_hours: usize,
    selection_metric: SelectionMetric,
    percentage_metric: PercentageMetric,
    feature_fraction: f64,
    forest_grid: ForestGrid,
    seasonal_grid: SeasonalGrid,
    zone_grids: BTreeMap<String, Vec<ForestParams>>,
}

impl ModelSelector {
    /// Create a selector for one family with default grids
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            seed: 42,
            validation_hours: 168,
            selection_metric: SelectionMetric::default(),
            percentage_metric: PercentageMetric::default(),
            feature_fraction: 1.0,
            forest_grid: ForestGrid::default(),
            seasonal_grid: SeasonalGrid::default(),
            zone_grids: BTreeMap::new(),
        }
    }

    /// Seed for stochastic families
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Trailing train rows used to score tree ensemble candidates
    pub fn with_validation_hours(mut self, hours: usize) -> Self {
        self.validation_hours = hours;
        self
    }

    /// Error that ranks tree ensemble candidates
    pub fn with_selection_metric(mut self, metric: SelectionMetric) -> Self {
        self.selection_metric = metric;
        self
    }

    /// Mask used when scoring validation predictions
    pub fn with_percentage_metric(mut self, metric: PercentageMetric) -> Self {
        self.percentage_metric = metric;
        self
    }

    /// Share of features considered at each split
    pub fn with_feature_fraction(mut self, fraction: f64) -> Self {
        self.feature_fraction = fraction;
        self
    }

    pub fn with_forest_grid(mut self, grid: ForestGrid) -> Self {
        self.forest_grid = grid;
        self
    }

    pub fn with_seasonal_grid(mut self, grid: SeasonalGrid) -> Self {
        self.seasonal_grid = grid;
        self
    }

    /// Per-zone candidate lists that replace the forest grid for those zones
    pub fn with_zone_grids(mut self, grids: BTreeMap<String, Vec<ForestParams>>) -> Self {
        self.zone_grids = grids;
        self
    }

    /// Family this selector searches
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Seed for stochastic families
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Search the configured family for one zone
    pub fn select(&self, zone: &str, train: &Dataset) -> Result<ZoneSelection> {
        match self.family {
            ModelFamily::Forest => {
                let candidates = self
                    .zone_grids
                    .get(zone)
                    .cloned()
                    .unwrap_or_else(|| self.forest_grid.candidates());
                self.select_forest(zone, train, &candidates)
            }
            ModelFamily::Seasonal => {
                self.select_seasonal(zone, train, &self.seasonal_grid.candidates())
            }
        }
    }

    /// Score each forest on a trailing validation window carved from `train`,
    /// then refit the winner on all of `train`
    pub fn select_forest(
        &self,
        zone: &str,
        train: &Dataset,
        candidates: &[ForestParams],
    ) -> Result<ZoneSelection> {
        let rows = train.len();
        if self.validation_hours == 0 || rows <= self.validation_hours {
            return Err(ForecastError::InsufficientHistory {
                rows,
                holdout: self.validation_hours,
            });
        }
        let boundary = rows - self.validation_hours;
        let fit = train.slice(0..boundary)?;
        let validation = train.slice(boundary..rows)?;

        let results: Vec<Result<f64>> = candidates
            .par_iter()
            .map(|params| self.score_forest(zone, params, &fit, &validation))
            .collect();

        let outcomes = self.log_outcomes(
            zone,
            candidates.iter().map(|p| Hyperparameters::Forest(*p)),
            &results,
        );
        let (index, score) = best_candidate(&results).ok_or_else(|| ForecastError::NoViableModel {
            zone: zone.to_string(),
            attempted: candidates.len(),
        })?;

        let winner = candidates[index];
        let refit = RandomForest::new(winner, self.seed)?
            .with_feature_fraction(self.feature_fraction)?
            .train(&train.zone_frame(zone)?)?;
        info!(zone, params = %winner, score, "selected forest");

        Ok(ZoneSelection {
            model: ZoneModel::new(
                zone,
                Hyperparameters::Forest(winner),
                FittedModel::from(refit),
                Some(self.seed),
            ),
            score,
            candidates: outcomes,
        })
    }

    /// Fit each order on all of `train` and keep the lowest AIC.
    ///
    /// Every order is scored over the same trailing rows, starting after the
    /// largest warmup among orders that fit in the frame.
    pub fn select_seasonal(
        &self,
        zone: &str,
        train: &Dataset,
        candidates: &[SeasonalOrder],
    ) -> Result<ZoneSelection> {
        let frame = train.zone_frame(zone)?;
        let warmup = candidates
            .iter()
            .map(SeasonalOrder::warmup)
            .filter(|&rows| rows < frame.len())
            .max()
            .unwrap_or(0);
        debug!(zone, warmup, "seasonal estimation window");

        let fitted: Vec<Result<_>> = candidates
            .par_iter()
            .map(|order| {
                SeasonalArima::new(*order)?
                    .with_warmup(warmup)
                    .train(&frame)
            })
            .collect();
        let results: Vec<Result<f64>> = fitted
            .iter()
            .map(|r| match r {
                Ok(model) => model.information_criterion().ok_or_else(|| {
                    ForecastError::ForecastingError("Model has no AIC".to_string())
                }),
                Err(e) => Err(ForecastError::ForecastingError(e.to_string())),
            })
            .collect();

        let outcomes = self.log_outcomes(
            zone,
            candidates.iter().map(|o| Hyperparameters::Seasonal(*o)),
            &results,
        );
        let (index, score) = best_candidate(&results).ok_or_else(|| ForecastError::NoViableModel {
            zone: zone.to_string(),
            attempted: candidates.len(),
        })?;

        let winner = candidates[index];
        let model = fitted
            .into_iter()
            .nth(index)
            .ok_or_else(|| ForecastError::ForecastingError("Winning fit missing".to_string()))??;
        info!(zone, order = %winner, aic = score, "selected seasonal model");

        Ok(ZoneSelection {
            model: ZoneModel::new(
                zone,
                Hyperparameters::Seasonal(winner),
                FittedModel::from(model),
                None,
            ),
            score,
            candidates: outcomes,
        })
    }

    fn score_forest(
        &self,
        zone: &str,
        params: &ForestParams,
        fit: &Dataset,
        validation: &Dataset,
    ) -> Result<f64> {
        let trained = RandomForest::new(*params, self.seed)?
            .with_feature_fraction(self.feature_fraction)?
            .train(&fit.zone_frame(zone)?)?;
        let frame = validation.zone_frame(zone)?;
        let predictions = trained.predict(&frame)?;
        let report = evaluate(frame.labels(), &predictions, self.percentage_metric)?;
        report.score(self.selection_metric).value("validation error")
    }

    fn log_outcomes(
        &self,
        zone: &str,
        hyperparameters: impl Iterator<Item = Hyperparameters>,
        results: &[Result<f64>],
    ) -> Vec<CandidateOutcome> {
        hyperparameters
            .zip(results)
            .map(|(hyperparameters, result)| match result {
                Ok(score) => {
                    debug!(zone, candidate = %hyperparameters, score, "scored candidate");
                    CandidateOutcome {
                        hyperparameters,
                        score: Some(*score),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(zone, candidate = %hyperparameters, error = %e, "candidate rejected");
                    CandidateOutcome {
                        hyperparameters,
                        score: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }
}

/// Lowest finite score, earliest index on ties
pub fn best_candidate(results: &[Result<f64>]) -> Option<(usize, f64)> {
    results
        .par_iter()
        .enumerate()
        .filter_map(|(i, r)| r.as_ref().ok().filter(|s| s.is_finite()).map(|s| (i, *s)))
        .reduce_with(|a, b| match a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)) {
            Ordering::Greater => b,
            _ => a,
        })
}
