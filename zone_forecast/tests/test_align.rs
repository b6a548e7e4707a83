mod common;

use approx::assert_relative_eq;
use chrono::Duration;
use common::{hours, start};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use std::collections::BTreeMap;
use zone_forecast::align::{apply_negative_policy, fill_gaps, hourly_grid, reindex};
use zone_forecast::{ForecastError, NegativePricePolicy, RawPriceTable, SeriesAligner};

fn table(
    timestamps: Vec<chrono::DateTime<chrono::Utc>>,
    zones: &[(&str, Vec<Option<f64>>)],
) -> RawPriceTable {
    let zones: BTreeMap<String, Vec<Option<f64>>> = zones
        .iter()
        .map(|(z, v)| (z.to_string(), v.clone()))
        .collect();
    RawPriceTable::new(timestamps, zones).unwrap()
}

#[test]
fn test_multi_hour_gap_is_ramped() {
    let ts = vec![start(), start() + Duration::hours(3)];
    let raw = table(ts, &[("NO1", vec![Some(10.0), Some(40.0)])]);

    let outcome = SeriesAligner::default().align(&raw).unwrap();
    let series = outcome.table.zone("NO1").unwrap();

    assert_eq!(series.timestamps(), hours(4).as_slice());
    for (actual, expected) in series.values().iter().zip([10.0, 20.0, 30.0, 40.0]) {
        assert_relative_eq!(*actual, expected, epsilon = 1e-9);
    }
}

#[test]
fn test_sub_hour_stamps_are_floored_and_last_wins() {
    let ts = vec![
        start() + Duration::minutes(10),
        start() + Duration::minutes(50),
        start() + Duration::hours(1) + Duration::minutes(5),
    ];
    let raw = table(ts, &[("NO1", vec![Some(1.0), Some(2.0), Some(3.0)])]);

    let outcome = SeriesAligner::default().align(&raw).unwrap();
    let series = outcome.table.zone("NO1").unwrap();

    assert_eq!(series.timestamps(), hours(2).as_slice());
    assert_eq!(series.values(), &[2.0, 3.0]);
}

#[test]
fn test_edges_are_filled_from_nearest_known_value() {
    let raw = table(
        hours(6),
        &[
            ("NO1", vec![None, None, Some(5.0), Some(7.0), None, None]),
            ("NO2", vec![Some(1.0); 6]),
        ],
    );

    let outcome = SeriesAligner::default().align(&raw).unwrap();
    assert_eq!(
        outcome.table.zone("NO1").unwrap().values(),
        &[5.0, 5.0, 5.0, 7.0, 7.0, 7.0]
    );
}

#[rstest]
#[case(NegativePricePolicy::ClipToZero, vec![0.0, 1.0, 4.0])]
#[case(NegativePricePolicy::Keep, vec![-2.0, 1.0, 4.0])]
fn test_negative_price_policy(#[case] policy: NegativePricePolicy, #[case] expected: Vec<f64>) {
    let raw = table(hours(3), &[("NO1", vec![Some(-2.0), Some(1.0), Some(4.0)])]);

    let outcome = SeriesAligner::new(policy).align(&raw).unwrap();
    assert_eq!(outcome.table.zone("NO1").unwrap().values(), expected.as_slice());
}

#[test]
fn test_interpolation_happens_before_clipping() {
    // The ramp from -4 to 4 crosses zero; clipping first would flatten it
    let values = fill_gaps(&hours(5), &[Some(-4.0), None, None, None, Some(4.0)]).unwrap();
    assert_eq!(values, vec![-4.0, -2.0, 0.0, 2.0, 4.0]);

    let clipped = apply_negative_policy(values, NegativePricePolicy::ClipToZero);
    assert_eq!(clipped, vec![0.0, 0.0, 0.0, 2.0, 4.0]);
}

#[test]
fn test_zone_with_one_point_fails_alone() {
    let raw = table(
        hours(4),
        &[
            ("NO1", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            ("NO2", vec![None, Some(2.0), None, None]),
        ],
    );

    let outcome = SeriesAligner::default().align(&raw).unwrap();

    assert_eq!(outcome.table.zone_names(), vec!["NO1".to_string()]);
    assert!(matches!(
        outcome.failures.get("NO2"),
        Some(ForecastError::DataInsufficient { valid_points: 1, .. })
    ));
}

#[test]
fn test_non_finite_observations_count_as_missing() {
    let raw = table(
        hours(3),
        &[("NO1", vec![Some(f64::INFINITY), Some(f64::NAN), Some(3.0)])],
    );

    let outcome = SeriesAligner::default().align(&raw).unwrap();
    assert!(matches!(
        outcome.failures.get("NO1"),
        Some(ForecastError::DataInsufficient { valid_points: 1, .. })
    ));
}

#[test]
fn test_empty_table_is_an_error() {
    let raw = table(Vec::new(), &[("NO1", Vec::new())]);
    assert!(SeriesAligner::default().align(&raw).is_err());
}

#[test]
fn test_reindex_places_by_hour() {
    let grid = hourly_grid(start(), start() + Duration::hours(3));
    let placed = reindex(
        &grid,
        &[start() + Duration::hours(2), start()],
        &[Some(2.0), Some(0.5)],
    )
    .unwrap();

    assert_eq!(placed, vec![Some(0.5), None, Some(2.0), None]);
}

#[test]
fn test_random_gappy_series_align_to_one_row_per_hour() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 500;
    let mut ts = Vec::new();
    let mut values = Vec::new();
    for t in hours(n) {
        if rng.gen_bool(0.7) {
            ts.push(t + Duration::minutes(rng.gen_range(0..60)));
            values.push(Some(rng.gen_range(-20.0..120.0)));
        }
    }
    let first = *ts.first().unwrap();
    let last = *ts.last().unwrap();
    let raw = table(ts, &[("NO3", values)]);

    let outcome = SeriesAligner::default().align(&raw).unwrap();
    let series = outcome.table.zone("NO3").unwrap();

    let expected_hours = (last - first).num_hours() as usize + 1;
    assert!(series.len() >= expected_hours);
    assert!(series.timestamps().windows(2).all(|w| w[1] - w[0] == Duration::hours(1)));
    assert!(series.values().iter().all(|v| *v >= 0.0 && v.is_finite()));
}
