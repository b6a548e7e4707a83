//! Shared fixtures: seeded synthetic hourly prices for integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use zone_forecast::{
    build_dataset, Dataset, FeatureBuilder, FeatureConfig, NegativePricePolicy, RawPriceTable,
    SeriesAligner,
};

pub const ZONES: [&str; 5] = ["NO1", "NO2", "NO3", "NO4", "NO5"];

/// Midnight UTC on 2024-01-01
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `n` consecutive hours from [`start`]
pub fn hours(n: usize) -> Vec<DateTime<Utc>> {
    (0..n).map(|i| start() + Duration::hours(i as i64)).collect()
}

/// Daily-cycle price with Gaussian noise, always positive
pub fn synthetic_prices(n: usize, base: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    (0..n)
        .map(|i| {
            let phase = (i % 24) as f64 / 24.0 * std::f64::consts::TAU;
            (base + 10.0 * phase.sin() + noise.sample(&mut rng)).max(1.0)
        })
        .collect()
}

/// Raw table with every zone fully observed
pub fn price_table(n: usize, seed: u64) -> RawPriceTable {
    let zones: BTreeMap<String, Vec<Option<f64>>> = ZONES
        .iter()
        .enumerate()
        .map(|(i, z)| {
            let values = synthetic_prices(n, 50.0 + 10.0 * i as f64, seed + i as u64);
            (z.to_string(), values.into_iter().map(Some).collect())
        })
        .collect();
    RawPriceTable::new(hours(n), zones).unwrap()
}

/// Aligned, featurised and labelled dataset for every zone
pub fn dataset(n: usize, seed: u64) -> Dataset {
    let aligned = SeriesAligner::new(NegativePricePolicy::ClipToZero)
        .align(&price_table(n, seed))
        .unwrap()
        .table;
    let features = FeatureBuilder::new(FeatureConfig::default())
        .unwrap()
        .build(&aligned, None)
        .unwrap();
    build_dataset(&features, &aligned.zone_names()).unwrap()
}

/// Reproducible, roughly Gaussian noise (Irwin-Hall sum of twelve uniforms
/// drawn from a 64-bit LCG), so expected model choices can be worked out
/// off-line for a fixed seed
pub fn lcg_noise(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            let mut sum = 0.0;
            for _ in 0..12 {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                sum += (state >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
            }
            sum - 6.0
        })
        .collect()
}

/// `x[t] = phi x[t-1] + seasonal_phi x[t-24] + e[t]`, shifted to 100 and
/// scaled by 5, after a 240-hour burn-in
pub fn seasonal_ar_prices(n: usize, seed: u64, phi: f64, seasonal_phi: f64) -> Vec<f64> {
    let burn = 240;
    let noise = lcg_noise(n + burn, seed);
    let mut x = vec![0.0; n + burn];
    for t in 0..n + burn {
        let short = if t >= 1 { x[t - 1] } else { 0.0 };
        let seasonal = if t >= 24 { x[t - 24] } else { 0.0 };
        x[t] = phi * short + seasonal_phi * seasonal + noise[t];
    }
    x[burn..].iter().map(|v| 100.0 + 5.0 * v).collect()
}

/// Dataset holding only NO1, with negative prices kept as-is
pub fn single_zone_dataset(prices: &[f64]) -> Dataset {
    let mut zones = BTreeMap::new();
    zones.insert(
        "NO1".to_string(),
        prices.iter().copied().map(Some).collect::<Vec<_>>(),
    );
    let raw = RawPriceTable::new(hours(prices.len()), zones).unwrap();
    let aligned = SeriesAligner::new(NegativePricePolicy::Keep)
        .align(&raw)
        .unwrap()
        .table;
    let features = FeatureBuilder::new(FeatureConfig::default())
        .unwrap()
        .build(&aligned, None)
        .unwrap();
    build_dataset(&features, &aligned.zone_names()).unwrap()
}
