//! Seasonal autoregressive model
//!
//! The price series is differenced with `(1-B)^d (1-B^m)^D` and the result is
//! modelled as an ARMA process whose lag sets are the union of the short lags
//! `1..=p` / `1..=q` and the seasonal lags `m, 2m, ..` (additive, not the
//! multiplicative form). Coefficients come from two-stage Hannan-Rissanen
//! least squares: a long autoregression supplies residual estimates, then the
//! differenced series is regressed on its own lags and the lagged residuals.

use crate::error::{ForecastError, Result};
use crate::models::{ForecastModel, Hyperparameters, TrainedForecastModel, ZoneFrame};
use chrono::{DateTime, Duration, Utc};
use price_math::least_squares;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const UNSTABLE_RESIDUAL_RATIO: f64 = 1e3;

/// Non-seasonal `(p, d, q)` and seasonal `(P, D, Q, m)` orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonalOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    /// Season length in hours
    pub period: usize,
}

impl SeasonalOrder {
    /// Create an order
    pub fn new(
        (p, d, q): (usize, usize, usize),
        (seasonal_p, seasonal_d, seasonal_q, period): (usize, usize, usize, usize),
    ) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p,
            seasonal_d,
            seasonal_q,
            period,
        }
    }

    /// Seasonal terms need a period of at least two
    pub fn validate(&self) -> Result<()> {
        let seasonal = self.seasonal_p + self.seasonal_d + self.seasonal_q > 0;
        if seasonal && self.period < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "Seasonal period must be at least 2, got {}",
                self.period
            )));
        }
        Ok(())
    }

    /// Leading price rows that never enter the scored regression: the
    /// differencing degree plus the first row with every lag available
    pub fn warmup(&self) -> usize {
        self.differencing_degree() + self.regression_start()
    }

    fn differencing_degree(&self) -> usize {
        self.d + self.seasonal_d * self.period
    }

    /// Order of the long autoregression behind the residual estimates
    fn long_order(&self) -> usize {
        if self.q + self.seasonal_q == 0 {
            return 0;
        }
        let ar = self.p + self.period * self.seasonal_p;
        let ma = self.q + self.period * self.seasonal_q;
        ar.max(ma) + 1
    }

    /// First differenced row whose AR lags and lagged residuals all exist
    fn regression_start(&self) -> usize {
        let ar = self.ar_lags().last().copied().unwrap_or(0);
        let ma = self.ma_lags().last().copied().unwrap_or(0);
        ar.max(self.long_order() + ma)
    }

    fn ar_lags(&self) -> Vec<usize> {
        lag_set(self.p, self.seasonal_p, self.period)
    }

    fn ma_lags(&self) -> Vec<usize> {
        lag_set(self.q, self.seasonal_q, self.period)
    }

    /// Coefficients of `(1-B)^d (1-B^m)^D`, lowest power first
    fn difference_polynomial(&self) -> Vec<f64> {
        let mut poly = vec![1.0];
        for _ in 0..self.d {
            poly = multiply(&poly, &lag_operator(1));
        }
        for _ in 0..self.seasonal_d {
            poly = multiply(&poly, &lag_operator(self.period));
        }
        poly
    }
}

impl fmt::Display for SeasonalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SARIMA({},{},{})x({},{},{},{})",
            self.p,
            self.d,
            self.q,
            self.seasonal_p,
            self.seasonal_d,
            self.seasonal_q,
            self.period
        )
    }
}

/// Untrained seasonal model
#[derive(Debug, Clone)]
pub struct SeasonalArima {
    name: String,
    order: SeasonalOrder,
    warmup: usize,
}

impl SeasonalArima {
    /// Create a model for one order
    pub fn new(order: SeasonalOrder) -> Result<Self> {
        order.validate()?;
        Ok(Self {
            name: order.to_string(),
            warmup: order.warmup(),
            order,
        })
    }

    /// Skip at least `rows` leading prices when scoring the fit.
    ///
    /// AIC values are only comparable when computed over the same rows, so
    /// every order of a grid should share the grid's largest warmup.
    pub fn with_warmup(mut self, rows: usize) -> Self {
        self.warmup = rows.max(self.order.warmup());
        self
    }

    /// Model order
    pub fn order(&self) -> &SeasonalOrder {
        &self.order
    }
}

impl ForecastModel for SeasonalArima {
    type Trained = TrainedSeasonal;

    fn train(&self, frame: &ZoneFrame<'_>) -> Result<TrainedSeasonal> {
        let prices: Vec<f64> = frame
            .prices()
            .iter()
            .map(|p| {
                p.filter(|v| v.is_finite()).ok_or_else(|| {
                    ForecastError::ForecastingError(format!(
                        "Zone {} has missing prices in the training frame",
                        frame.zone()
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let poly = self.order.difference_polynomial();
        let w = apply_difference(&prices, &poly);
        let start = self.warmup - self.order.differencing_degree();
        let fit = hannan_rissanen(&w, &self.order, start)?;

        let mut state = FilterState::new(&fit, poly, self.order);
        for &y in &prices {
            state.observe(y);
        }
        if !state.forecast().is_finite() {
            return Err(ForecastError::ForecastingError(format!(
                "{} produced a non-finite forecast",
                self.order
            )));
        }
        // Non-invertible moving average terms make filtered residuals explode
        if !(state.residual_rms() <= UNSTABLE_RESIDUAL_RATIO * fit.sigma) {
            return Err(ForecastError::ForecastingError(format!(
                "{} is unstable: filtered residuals diverge",
                self.order
            )));
        }

        debug!(
            zone = frame.zone(),
            order = %self.order,
            aic = fit.aic,
            "fitted seasonal model"
        );

        Ok(TrainedSeasonal {
            name: self.name.clone(),
            order: self.order,
            aic: fit.aic,
            state,
            width: frame.features().width(),
            price_column: frame.price_column(),
            last_timestamp: frame.features().timestamps().last().copied(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Seasonal(self.order)
    }
}

/// Fitted seasonal model, positioned at the end of its training series
#[derive(Debug, Clone)]
pub struct TrainedSeasonal {
    name: String,
    order: SeasonalOrder,
    aic: f64,
    state: FilterState,
    width: usize,
    price_column: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl TrainedSeasonal {
    /// Model order
    pub fn order(&self) -> &SeasonalOrder {
        &self.order
    }

    /// Akaike information criterion of the fit
    pub fn aic(&self) -> f64 {
        self.aic
    }
}

impl TrainedForecastModel for TrainedSeasonal {
    /// One-step-ahead forecasts rolling over the frame's observed prices.
    ///
    /// The frame must start the hour after the training series ended.
    fn predict(&self, frame: &ZoneFrame<'_>) -> Result<Vec<f64>> {
        let first = frame.features().timestamps().first();
        if let (Some(last), Some(first)) = (self.last_timestamp, first) {
            if *first != last + Duration::hours(1) {
                return Err(ForecastError::ForecastingError(format!(
                    "Frame starts at {}, expected the hour after {}",
                    first, last
                )));
            }
        }

        let mut state = self.state.clone();
        frame
            .prices()
            .iter()
            .map(|p| {
                let price = p.filter(|v| v.is_finite()).ok_or_else(|| {
                    ForecastError::ForecastingError("Missing price in forecast frame".to_string())
                })?;
                state.observe(price);
                Ok(state.forecast())
            })
            .collect()
    }

    /// Next-hour forecast given the hour after training, taken from the row's
    /// price column
    fn predict_row(&self, row: &[Option<f64>]) -> Result<f64> {
        if row.len() != self.width {
            return Err(ForecastError::SchemaMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        let price = row[self.price_column]
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ForecastError::ForecastingError("Row has no current price".to_string())
            })?;

        let mut state = self.state.clone();
        state.observe(price);
        Ok(state.forecast())
    }

    fn information_criterion(&self) -> Option<f64> {
        Some(self.aic)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
struct Coefficients {
    intercept: f64,
    ar: Vec<(usize, f64)>,
    ma: Vec<(usize, f64)>,
    aic: f64,
    /// Standard deviation of the stage-two residuals
    sigma: f64,
}

/// Two-stage least squares on the differenced series, scored from row `start`
fn hannan_rissanen(w: &[f64], order: &SeasonalOrder, start: usize) -> Result<Coefficients> {
    let ar_lags = order.ar_lags();
    let ma_lags = order.ma_lags();
    let with_intercept = order.d + order.seasonal_d == 0;
    let long_order = order.long_order();

    // Stage 1: long autoregression for residual estimates
    let residuals = if ma_lags.is_empty() {
        vec![0.0; w.len()]
    } else {
        let lags: Vec<usize> = (1..=long_order).collect();
        let (design, targets) = lagged_design(w, None, &lags, &[], long_order, true);
        if targets.len() <= design.first().map_or(0, Vec::len) {
            return Err(ForecastError::ForecastingError(format!(
                "{} observations are too few for {}",
                w.len(),
                order
            )));
        }
        let beta = least_squares(&design, &targets)?;
        let mut residuals = vec![0.0; w.len()];
        for (row, t) in design.iter().zip(long_order..w.len()) {
            residuals[t] = w[t] - dot(row, &beta);
        }
        residuals
    };

    // Stage 2: regression on AR lags and lagged residuals
    let start = start.max(order.regression_start());
    let (design, targets) =
        lagged_design(w, Some(&residuals), &ar_lags, &ma_lags, start, with_intercept);
    let k = ar_lags.len() + ma_lags.len() + usize::from(with_intercept);
    if targets.len() <= k + 1 {
        return Err(ForecastError::ForecastingError(format!(
            "{} observations are too few for {}",
            w.len(),
            order
        )));
    }

    let beta = if k == 0 {
        Vec::new()
    } else {
        least_squares(&design, &targets)?
    };
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::ForecastingError(format!(
            "{} produced non-finite coefficients",
            order
        )));
    }

    let rss: f64 = design
        .iter()
        .zip(&targets)
        .map(|(row, y)| (y - dot(row, &beta)).powi(2))
        .sum();
    let n = targets.len() as f64;
    if !(rss > 0.0) || !rss.is_finite() {
        return Err(ForecastError::ForecastingError(format!(
            "{} left a degenerate residual sum of squares ({})",
            order, rss
        )));
    }
    // One extra parameter for the innovation variance
    let aic = n * (rss / n).ln() + 2.0 * (k + 1) as f64;

    let mut coefficients = beta.into_iter();
    let intercept = if with_intercept {
        coefficients.next().unwrap_or(0.0)
    } else {
        0.0
    };
    let ar = ar_lags.iter().copied().zip(coefficients.by_ref()).collect();
    let ma = ma_lags.iter().copied().zip(coefficients).collect();

    Ok(Coefficients {
        intercept,
        ar,
        ma,
        aic,
        sigma: (rss / n).sqrt(),
    })
}

/// Rows `start..w.len()` of `[1?, w lags.., residual lags..]` with target `w[t]`
fn lagged_design(
    w: &[f64],
    residuals: Option<&[f64]>,
    ar_lags: &[usize],
    ma_lags: &[usize],
    start: usize,
    with_intercept: bool,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut design = Vec::new();
    let mut targets = Vec::new();
    for t in start..w.len() {
        let mut row = Vec::with_capacity(ar_lags.len() + ma_lags.len() + 1);
        if with_intercept {
            row.push(1.0);
        }
        row.extend(ar_lags.iter().map(|&l| w[t - l]));
        if let Some(e) = residuals {
            row.extend(ma_lags.iter().map(|&l| e[t - l]));
        }
        design.push(row);
        targets.push(w[t]);
    }
    (design, targets)
}

/// Recursive one-step filter over the original price scale
#[derive(Debug, Clone)]
struct FilterState {
    intercept: f64,
    ar: Vec<(usize, f64)>,
    ma: Vec<(usize, f64)>,
    poly: Vec<f64>,
    y: Vec<f64>,
    w: Vec<f64>,
    e: Vec<f64>,
    keep: usize,
}

impl FilterState {
    fn new(fit: &Coefficients, poly: Vec<f64>, order: SeasonalOrder) -> Self {
        let max_lag = order
            .ar_lags()
            .into_iter()
            .chain(order.ma_lags())
            .max()
            .unwrap_or(0);
        Self {
            intercept: fit.intercept,
            ar: fit.ar.clone(),
            ma: fit.ma.clone(),
            keep: max_lag.max(poly.len()),
            poly,
            y: Vec::new(),
            w: Vec::new(),
            e: Vec::new(),
        }
    }

    fn lag(values: &[f64], lag: usize) -> f64 {
        if lag <= values.len() {
            values[values.len() - lag]
        } else {
            0.0
        }
    }

    /// Forecast of the next price given everything observed so far
    fn forecast(&self) -> f64 {
        let w_hat = self.intercept
            + self.ar.iter().map(|&(l, c)| c * Self::lag(&self.w, l)).sum::<f64>()
            + self.ma.iter().map(|&(l, c)| c * Self::lag(&self.e, l)).sum::<f64>();
        // Undo the differencing with the known past prices
        let known: f64 = self
            .poly
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, c)| c * Self::lag(&self.y, k))
            .sum();
        w_hat - known
    }

    /// Root mean square of the retained residual history
    fn residual_rms(&self) -> f64 {
        if self.e.is_empty() {
            return 0.0;
        }
        (self.e.iter().map(|e| e * e).sum::<f64>() / self.e.len() as f64).sqrt()
    }

    fn observe(&mut self, price: f64) {
        let seen = self.y.len() + 1;
        let warm = seen >= self.poly.len();
        let error = if warm { price - self.forecast() } else { 0.0 };

        self.y.push(price);
        let w = if warm {
            self.poly
                .iter()
                .enumerate()
                .map(|(k, c)| c * Self::lag(&self.y, k + 1))
                .sum()
        } else {
            0.0
        };
        self.w.push(w);
        self.e.push(error);

        // Histories only need the longest lag
        if self.y.len() > 4 * self.keep.max(1) {
            let cut = self.y.len() - self.keep;
            self.y.drain(..cut);
            self.w.drain(..cut);
            self.e.drain(..cut);
        }
    }
}

fn lag_set(short: usize, seasonal: usize, period: usize) -> Vec<usize> {
    let mut lags: Vec<usize> = (1..=short).chain((1..=seasonal).map(|j| j * period)).collect();
    lags.sort_unstable();
    lags.dedup();
    lags
}

/// `1 - B^lag`
fn lag_operator(lag: usize) -> Vec<f64> {
    let mut poly = vec![0.0; lag + 1];
    poly[0] = 1.0;
    poly[lag] = -1.0;
    poly
}

fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `w[t] = sum_k poly[k] * y[t - k]` for every `t` with a full history
fn apply_difference(y: &[f64], poly: &[f64]) -> Vec<f64> {
    let degree = poly.len() - 1;
    (degree..y.len())
        .map(|t| poly.iter().enumerate().map(|(k, c)| c * y[t - k]).sum())
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
