//! Bagged regression trees
//!
//! Each tree is a CART regressor minimising squared error, grown on a
//! bootstrap sample drawn with its own seed (`seed + tree index`), so the
//! ensemble is reproducible regardless of how trees are scheduled across
//! threads. Missing feature values are never imputed: split search only uses
//! rows where the feature is present, and rows missing it follow the direction
//! learned for that split.

use crate::error::{ForecastError, Result};
use crate::models::{ForecastModel, Hyperparameters, TrainedForecastModel, ZoneFrame};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use tracing::debug;

const MIN_GAIN: f64 = 1e-12;

/// Tree ensemble hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth, unbounded when `None`
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Minimum rows in each leaf
    pub min_samples_leaf: usize,
}

impl ForestParams {
    /// Create a configuration
    pub fn new(n_estimators: usize, max_depth: Option<usize>, min_samples_leaf: usize) -> Self {
        Self {
            n_estimators,
            max_depth,
            min_samples_leaf,
        }
    }

    /// Reject empty ensembles, zero depth and empty leaves
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be positive".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "max_depth must be positive when set".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self
            .max_depth
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        write!(
            f,
            "forest(n_estimators={}, max_depth={}, min_samples_leaf={})",
            self.n_estimators, depth, self.min_samples_leaf
        )
    }
}

/// Untrained tree ensemble
#[derive(Debug, Clone)]
pub struct RandomForest {
    name: String,
    params: ForestParams,
    seed: u64,
    feature_fraction: f64,
}

impl RandomForest {
    /// Create an ensemble using every feature at each split
    pub fn new(params: ForestParams, seed: u64) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            name: "RandomForest".to_string(),
            params,
            seed,
            feature_fraction: 1.0,
        })
    }

    /// Consider only this share of the features at each split
    pub fn with_feature_fraction(mut self, fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "feature_fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        self.feature_fraction = fraction;
        Ok(self)
    }

    /// Hyperparameters
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Base seed
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl ForecastModel for RandomForest {
    type Trained = TrainedForest;

    fn train(&self, frame: &ZoneFrame<'_>) -> Result<TrainedForest> {
        let columns: Vec<&[Option<f64>]> =
            frame.features().columns().iter().map(|c| c.values()).collect();
        let width = columns.len();
        if width == 0 {
            return Err(ForecastError::ForecastingError(
                "Cannot grow trees without features".to_string(),
            ));
        }

        let targets: Vec<f64> = frame
            .labels()
            .iter()
            .map(|l| l.filter(|v| v.is_finite()).unwrap_or(f64::NAN))
            .collect();
        let rows: Vec<usize> = (0..targets.len())
            .filter(|&i| targets[i].is_finite())
            .collect();
        if rows.len() < 2 * self.params.min_samples_leaf {
            return Err(ForecastError::ForecastingError(format!(
                "{} labelled rows cannot support min_samples_leaf={}",
                rows.len(),
                self.params.min_samples_leaf
            )));
        }

        let max_features = ((width as f64 * self.feature_fraction).ceil() as usize).clamp(1, width);

        let trees: Vec<Tree> = (0..self.params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..rows.len())
                    .map(|_| rows[rng.gen_range(0..rows.len())])
                    .collect();

                let mut builder = TreeBuilder {
                    columns: &columns,
                    targets: &targets,
                    params: &self.params,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(bootstrap);
                Tree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        debug!(
            zone = frame.zone(),
            params = %self.params,
            rows = rows.len(),
            nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "grew forest"
        );

        Ok(TrainedForest {
            name: self.name.clone(),
            trees,
            width,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Forest(self.params)
    }
}

/// Fitted tree ensemble
#[derive(Debug, Clone)]
pub struct TrainedForest {
    name: String,
    trees: Vec<Tree>,
    width: usize,
}

impl TrainedForest {
    /// Number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of features each row must carry
    pub fn width(&self) -> usize {
        self.width
    }
}

impl TrainedForecastModel for TrainedForest {
    fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>> {
        let features = frame.features();
        if features.width() != self.width {
            return Err(ForecastError::SchemaMismatch {
                expected: self.width,
                actual: features.width(),
            });
        }

        (0..features.len())
            .map(|i| {
                let row = features
                    .row(i)
                    .ok_or_else(|| ForecastError::DataError(format!("Row {} missing", i)))?;
                self.predict_row(&row)
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
        Ok(self.trees.iter().map(|t| t.predict(row)).mean())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        missing_left: bool,
        left: usize,
        right: usize,
    },
}

/// Nodes stored in an arena; index 0 is the root
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[Option<f64>]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    missing_left,
                    left,
                    right,
                } => {
                    let go_left = match row[*feature].filter(|v| v.is_finite()) {
                        Some(x) => x <= *threshold,
                        None => *missing_left,
                    };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    missing_left: bool,
    score: f64,
}

struct TreeBuilder<'a> {
    columns: &'a [&'a [Option<f64>]],
    targets: &'a [f64],
    params: &'a ForestParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow depth-first with an explicit stack of pending nodes
    fn grow(&mut self, bootstrap: Vec<usize>) {
        self.nodes.push(Node::Leaf { value: 0.0 });
        let mut pending = vec![(0usize, bootstrap, 0usize)];

        while let Some((slot, indices, depth)) = pending.pop() {
            let value = indices.iter().map(|&i| self.targets[i]).mean();
            self.nodes[slot] = Node::Leaf { value };

            let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
            if depth_reached || indices.len() < 2 * self.params.min_samples_leaf {
                continue;
            }
            let Some(split) = self.best_split(&indices) else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                indices.iter().copied().partition(|&i| {
                    match self.columns[split.feature][i] {
                        Some(x) => x <= split.threshold,
                        None => split.missing_left,
                    }
                });

            let left = self.nodes.len();
            self.nodes.push(Node::Leaf { value });
            let right = self.nodes.len();
            self.nodes.push(Node::Leaf { value });
            self.nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                missing_left: split.missing_left,
                left,
                right,
            };

            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<Split> {
        let (n, sum, sq) = moments(indices.iter().map(|&i| self.targets[i]));
        let parent = sse(n, sum, sq);
        if parent <= MIN_GAIN {
            return None;
        }

        let width = self.columns.len();
        let candidates: Vec<usize> = if self.max_features < width {
            let mut chosen = sample(&mut self.rng, width, self.max_features).into_vec();
            chosen.sort_unstable();
            chosen
        } else {
            (0..width).collect()
        };

        let leaf = self.params.min_samples_leaf;
        let mut best: Option<Split> = None;

        for feature in candidates {
            let column = self.columns[feature];
            let mut present: Vec<(f64, f64)> = Vec::with_capacity(indices.len());
            let mut missing = Vec::new();
            for &i in indices {
                match column[i].filter(|v| v.is_finite()) {
                    Some(x) => present.push((x, self.targets[i])),
                    None => missing.push(self.targets[i]),
                }
            }
            if present.is_empty() {
                continue;
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (m_n, m_sum, m_sq) = moments(missing.iter().copied());
            let (p_n, p_sum, p_sq) = moments(present.iter().map(|p| p.1));
            let (mut l_n, mut l_sum, mut l_sq) = (0.0, 0.0, 0.0);

            for k in 0..present.len() - 1 {
                let (x, y) = present[k];
                l_n += 1.0;
                l_sum += y;
                l_sq += y * y;

                let next = present[k + 1].0;
                if next <= x {
                    continue;
                }
                let (r_n, r_sum, r_sq) = (p_n - l_n, p_sum - l_sum, p_sq - l_sq);

                let directions: &[bool] = if m_n == 0.0 {
                    // Unseen missing values follow the larger child
                    if l_n >= r_n {
                        &[true]
                    } else {
                        &[false]
                    }
                } else {
                    &[true, false]
                };

                for &missing_left in directions {
                    let (ln, ls, lq, rn, rs, rq) = if missing_left {
                        (l_n + m_n, l_sum + m_sum, l_sq + m_sq, r_n, r_sum, r_sq)
                    } else {
                        (l_n, l_sum, l_sq, r_n + m_n, r_sum + m_sum, r_sq + m_sq)
                    };
                    if (ln as usize) < leaf || (rn as usize) < leaf {
                        continue;
                    }

                    let score = sse(ln, ls, lq) + sse(rn, rs, rq);
                    if score + MIN_GAIN < parent && best.map_or(true, |b| score < b.score) {
                        let mid = x + (next - x) / 2.0;
                        best = Some(Split {
                            feature,
                            threshold: if mid < next { mid } else { x },
                            missing_left,
                            score,
                        });
                    }
                }
            }

            // Present values left, missing values right
            if m_n > 0.0 && (p_n as usize) >= leaf && (m_n as usize) >= leaf {
                let score = sse(p_n, p_sum, p_sq) + sse(m_n, m_sum, m_sq);
                if score + MIN_GAIN < parent && best.map_or(true, |b| score < b.score) {
                    best = Some(Split {
                        feature,
                        threshold: present[present.len() - 1].0,
                        missing_left: false,
                        score,
                    });
                }
            }
        }

        best
    }
}

fn moments(values: impl Iterator<Item = f64>) -> (f64, f64, f64) {
    values.fold((0.0, 0.0, 0.0), |(n, s, q), y| (n + 1.0, s + y, q + y * y))
}

fn sse(n: f64, sum: f64, sq: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        (sq - sum * sum / n).max(0.0)
    }
}
