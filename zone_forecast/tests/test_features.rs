mod common;

use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use common::{hours, start};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use zone_forecast::features::{calendar_columns, pct_change_column, rolling_mean_columns};
use zone_forecast::{
    AlignedTable, FeatureBuilder, FeatureConfig, FeatureMatrix, NegativePricePolicy,
    RawPriceTable, SeriesAligner, WeatherTable,
};

fn aligned(zones: &[(&str, Vec<f64>)]) -> AlignedTable {
    let n = zones[0].1.len();
    let columns: BTreeMap<String, Vec<Option<f64>>> = zones
        .iter()
        .map(|(z, v)| (z.to_string(), v.iter().copied().map(Some).collect()))
        .collect();
    let raw = RawPriceTable::new(hours(n), columns).unwrap();
    SeriesAligner::new(NegativePricePolicy::Keep)
        .align(&raw)
        .unwrap()
        .table
}

fn builder(windows: Vec<usize>) -> FeatureBuilder {
    FeatureBuilder::new(FeatureConfig {
        windows,
        ..FeatureConfig::default()
    })
    .unwrap()
}

fn values(matrix: &FeatureMatrix, name: &str) -> Vec<Option<f64>> {
    matrix.column(name).unwrap().values().to_vec()
}

#[test]
fn test_column_order_is_stable() {
    let table = aligned(&[("NO1", vec![1.0; 6]), ("NO2", vec![2.0; 6])]);
    let weather = WeatherTable::new(hours(6), vec![Some(0.0); 6], vec![Some(3.0); 6]).unwrap();

    let matrix = builder(vec![3, 6]).build(&table, Some(&weather)).unwrap();

    let expected = vec![
        "NO1", "NO2", "hour", "weekday", "is_weekend", "NO1_pct_hourly", "NO2_pct_hourly",
        "NO1_ma_3h", "NO1_ma_6h", "NO2_ma_3h", "NO2_ma_6h", "is_holiday", "temperature", "wind",
        "temp_ma_3h", "wind_ma_3h", "temp_ma_6h", "wind_ma_6h",
    ];
    assert_eq!(matrix.schema().columns().to_vec(), expected);
}

#[test]
fn test_weather_columns_skipped_without_source() {
    let table = aligned(&[("NO1", vec![1.0, 2.0, 3.0])]);

    let matrix = builder(vec![3]).build(&table, None).unwrap();

    assert!(matrix.column("temperature").is_none());
    assert!(matrix.column("temp_ma_3h").is_none());
    assert_eq!(matrix.width(), 1 + 3 + 1 + 1 + 1);
}

#[test]
fn test_weather_without_matching_stamps_is_skipped() {
    let table = aligned(&[("NO1", vec![1.0, 2.0, 3.0])]);
    let elsewhere = vec![start() - Duration::days(10)];
    let weather = WeatherTable::new(elsewhere, vec![Some(1.0)], vec![Some(1.0)]).unwrap();

    let matrix = builder(vec![3]).build(&table, Some(&weather)).unwrap();
    assert!(matrix.column("wind").is_none());
}

#[test]
fn test_percent_change_zero_denominator_becomes_missing() {
    let column = pct_change_column("NO1", &[0.0, 5.0, 5.0, 10.0], 100.0);

    assert_eq!(column.name(), "NO1_pct_hourly");
    assert_eq!(column.values(), &[None, None, Some(0.0), Some(1.0)]);
}

#[test]
fn test_percent_change_is_clipped() {
    let column = pct_change_column("NO1", &[1.0, 500.0, 0.001, 0.0], 100.0);

    assert_eq!(column.values()[1], Some(100.0));
    assert_relative_eq!(column.values()[2].unwrap(), -0.999998, epsilon = 1e-9);
    assert_eq!(column.values()[3], Some(-1.0));
    assert!(column
        .values()
        .iter()
        .flatten()
        .all(|v| (-100.0..=100.0).contains(v)));
}

#[test]
fn test_rolling_means_defined_from_first_row() {
    let columns = rolling_mean_columns("NO1", &[2.0, 4.0, 6.0, 8.0], &[3]).unwrap();

    assert_eq!(columns[0].name(), "NO1_ma_3h");
    let means: Vec<f64> = columns[0].values().iter().map(|v| v.unwrap()).collect();
    for (actual, expected) in means.iter().zip([2.0, 3.0, 4.0, 6.0]) {
        assert_relative_eq!(*actual, expected);
    }
}

#[test]
fn test_features_built_from_aligned_not_raw_prices() {
    // Hour 1 is missing in the raw data; its interpolated value must feed the windows
    let mut columns = BTreeMap::new();
    columns.insert("NO1".to_string(), vec![Some(10.0), Some(30.0)]);
    let raw = RawPriceTable::new(vec![start(), start() + Duration::hours(2)], columns).unwrap();
    let table = SeriesAligner::default().align(&raw).unwrap().table;

    let matrix = builder(vec![2]).build(&table, None).unwrap();

    assert_eq!(matrix.len(), 3);
    assert_relative_eq!(values(&matrix, "NO1_ma_2h")[2].unwrap(), 25.0);
    assert_relative_eq!(values(&matrix, "NO1_pct_hourly")[1].unwrap(), 1.0);
}

#[test]
fn test_every_column_populated_except_leading_pct() {
    let prices: Vec<f64> = (0..72).map(|i| 40.0 + (i % 7) as f64).collect();
    let table = aligned(&[("NO1", prices.clone()), ("NO2", prices)]);
    let weather = WeatherTable::new(hours(72), vec![Some(1.0); 72], vec![Some(2.0); 72]).unwrap();

    let matrix = builder(vec![3, 6, 24]).build(&table, Some(&weather)).unwrap();

    for column in matrix.columns() {
        if column.name().ends_with("_pct_hourly") {
            assert_eq!(column.values()[0], None);
            assert!(column.values()[1..].iter().all(Option::is_some));
        } else {
            assert!(column.is_complete(), "{} has gaps", column.name());
        }
    }
}

#[test]
fn test_coarse_weather_is_interpolated_and_edge_filled() {
    let table = aligned(&[("NO1", vec![1.0; 8])]);
    // Three-hourly observations starting at hour 1
    let stamps = vec![
        start() + Duration::hours(1),
        start() + Duration::hours(4),
        start() + Duration::hours(7),
    ];
    let weather = WeatherTable::new(
        stamps,
        vec![Some(0.0), Some(3.0), Some(6.0)],
        vec![Some(9.0), None, Some(3.0)],
    )
    .unwrap();

    let matrix = builder(vec![3]).build(&table, Some(&weather)).unwrap();

    let temperature: Vec<f64> = values(&matrix, "temperature").into_iter().flatten().collect();
    let expected = [0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    assert_eq!(temperature.len(), expected.len());
    for (actual, expected) in temperature.iter().zip(expected) {
        assert_relative_eq!(*actual, expected, epsilon = 1e-9);
    }

    let wind: Vec<f64> = values(&matrix, "wind").into_iter().flatten().collect();
    assert_relative_eq!(wind[0], 9.0);
    assert_relative_eq!(wind[4], 6.0, epsilon = 1e-9);
    assert_relative_eq!(wind[7], 3.0);
}

#[test]
fn test_calendar_uses_civil_time() {
    // 23:00 UTC on Sunday 2024-01-07 is 00:00 Monday in Oslo
    let ts = vec![Utc.with_ymd_and_hms(2024, 1, 7, 23, 0, 0).unwrap()];
    let columns = calendar_columns(&ts, chrono_tz::Europe::Oslo);

    assert_eq!(columns[0].values(), &[Some(0.0)]);
    assert_eq!(columns[1].values(), &[Some(0.0)]);
    assert_eq!(columns[2].values(), &[Some(0.0)]);

    let utc = calendar_columns(&ts, chrono_tz::UTC);
    assert_eq!(utc[0].values(), &[Some(23.0)]);
    assert_eq!(utc[1].values(), &[Some(6.0)]);
    assert_eq!(utc[2].values(), &[Some(1.0)]);
}

#[test]
fn test_holiday_flag_marks_constitution_day() {
    let mut columns = BTreeMap::new();
    let first = Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap();
    let stamps: Vec<_> = (0..24).map(|i| first + Duration::hours(i)).collect();
    columns.insert("NO1".to_string(), vec![Some(1.0); 24]);
    let raw = RawPriceTable::new(stamps, columns).unwrap();
    let table = SeriesAligner::default().align(&raw).unwrap().table;

    let matrix = builder(vec![3]).build(&table, None).unwrap();
    let flags = values(&matrix, "is_holiday");

    // 12:00 UTC on the 16th is 14:00 local; midnight local on the 17th is 22:00 UTC
    assert_eq!(flags[9], Some(0.0));
    assert_eq!(flags[10], Some(1.0));
    assert_eq!(flags[23], Some(1.0));
}

#[test]
fn test_invalid_windows_rejected() {
    assert!(FeatureBuilder::new(FeatureConfig {
        windows: vec![],
        ..FeatureConfig::default()
    })
    .is_err());
    assert!(FeatureBuilder::new(FeatureConfig {
        windows: vec![3, 0],
        ..FeatureConfig::default()
    })
    .is_err());
}

#[test]
fn test_matrix_rejects_duplicate_columns() {
    use zone_forecast::features::FeatureColumn;

    let result = FeatureMatrix::new(
        hours(2),
        vec![
            FeatureColumn::dense("a", vec![1.0, 2.0]),
            FeatureColumn::dense("a", vec![1.0, 2.0]),
        ],
    );
    assert!(result.is_err());
}

#[test]
fn test_non_finite_feature_values_stored_as_missing() {
    use zone_forecast::features::FeatureColumn;

    let column = FeatureColumn::new(
        "x",
        vec![Some(f64::INFINITY), Some(f64::NEG_INFINITY), Some(1.0)],
    );
    assert_eq!(column.values(), &[None, None, Some(1.0)]);
}
