mod common;

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use zone_forecast::pipeline::ZoneReport;
use zone_forecast::{
    ForecastError, ModelFamily, Pipeline, PipelineConfig, PipelineReport, PredictionRequest,
    RawPriceTable,
};

const SMALL_FOREST: &str = r#"
[features]
windows = [3, 24]

[backtest]
holdout_hours = 48

[model]
validation_hours = 48

[model.forest_grid]
n_estimators = [5]
max_depth = [4]
unbounded_depth = false
min_samples_leaf = [2, 5]
"#;

fn small_config() -> PipelineConfig {
    PipelineConfig::from_toml_str(SMALL_FOREST).unwrap()
}

#[test]
fn test_every_zone_completes() {
    let run = Pipeline::new(small_config())
        .unwrap()
        .run(&common::price_table(300, 3), None)
        .unwrap();

    assert_eq!(run.succeeded(), common::ZONES.to_vec());
    assert!(run.failed().is_empty());
    assert_eq!(run.dataset.len(), 299);

    for zone in common::ZONES {
        let outcome = run.zone(zone).unwrap().as_ref().unwrap();
        assert_eq!(outcome.holdout_rows, 48);
        assert_eq!(outcome.evaluation.rows_used, 48);
        assert!(outcome.evaluation.mae.value("mae").unwrap().is_finite());
        assert!(outcome.baseline.mae.is_defined());
        assert_eq!(outcome.candidates.len(), 2);
    }
}

#[test]
fn test_zone_with_short_holdout_history_does_not_block_others() {
    let mut config = small_config();
    config
        .backtest
        .holdout_overrides
        .insert("NO2".to_string(), 10_000);

    let run = Pipeline::new(config)
        .unwrap()
        .run(&common::price_table(300, 3), None)
        .unwrap();

    assert_eq!(run.succeeded(), vec!["NO1", "NO3", "NO4", "NO5"]);
    let failed = run.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "NO2");
    assert!(matches!(
        failed[0].1,
        ForecastError::InsufficientHistory {
            rows: 299,
            holdout: 10_000
        }
    ));
}

#[test]
fn test_zone_that_cannot_align_does_not_block_others() {
    let table = common::price_table(300, 4);
    let mut zones = BTreeMap::new();
    for zone in common::ZONES {
        let mut values = table.column(zone).unwrap().to_vec();
        if zone == "NO2" {
            // A single observation cannot be interpolated
            values = vec![None; values.len()];
            values[10] = Some(42.0);
        }
        zones.insert(zone.to_string(), values);
    }
    let raw = RawPriceTable::new(table.timestamps().to_vec(), zones).unwrap();

    let run = Pipeline::new(small_config()).unwrap().run(&raw, None).unwrap();

    assert_eq!(run.succeeded(), vec!["NO1", "NO3", "NO4", "NO5"]);
    assert!(matches!(
        run.zone("NO2"),
        Some(Err(ForecastError::DataInsufficient { valid_points: 1, .. }))
    ));
    assert!(run.dataset.features().column("NO2").is_none());
    assert!(run.dataset.labels().zone("NO2").is_none());
}

#[test]
fn test_seasonal_family_run() {
    let config = PipelineConfig::from_toml_str(
        r#"
[backtest]
holdout_hours = 24

[model]
family = "seasonal"

[model.seasonal_grid]
p = [0, 1]
d = [0]
q = [0]
seasonal_p = [0]
seasonal_d = [1]
seasonal_q = [0]
period = 24
"#,
    )
    .unwrap();
    assert_eq!(config.model.family, ModelFamily::Seasonal);

    let run = Pipeline::new(config)
        .unwrap()
        .run(&common::price_table(24 * 12 + 1, 5), None)
        .unwrap();

    assert_eq!(run.succeeded().len(), 5);
    let outcome = run.zone("NO3").unwrap().as_ref().unwrap();
    assert_eq!(outcome.model.seed(), None);
    assert_eq!(outcome.evaluation.rows_used, 24);
}

#[test]
fn test_registry_serves_completed_zones() {
    let run = Pipeline::new(small_config())
        .unwrap()
        .run(&common::price_table(300, 6), None)
        .unwrap();
    let registry = run.registry();
    assert_eq!(registry.zones(), common::ZONES.to_vec());

    let last = run.dataset.len() - 1;
    let row = run.dataset.features().row(last).unwrap();
    let request = PredictionRequest {
        zone: "no4".to_string(),
        features: row.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
    };
    let response = registry.predict(&request).unwrap();

    assert_eq!(response.zone, "NO4");
    assert!(response.prediction.is_finite());
    assert_eq!(
        &response.model,
        run.zone("NO4").unwrap().as_ref().unwrap().model.hyperparameters()
    );
}

#[test]
fn test_report_records_failures() {
    let mut config = small_config();
    config
        .backtest
        .holdout_overrides
        .insert("NO5".to_string(), 5_000);
    let run = Pipeline::new(config)
        .unwrap()
        .run(&common::price_table(300, 7), None)
        .unwrap();

    let report = run.report();
    assert_eq!(report.zones.len(), 5);
    assert_eq!(report.family, ModelFamily::Forest);
    assert!(matches!(report.zones["NO1"], ZoneReport::Completed { .. }));
    assert!(matches!(report.zones["NO5"], ZoneReport::Failed { .. }));

    let json = serde_json::to_string(&report).unwrap();
    let parsed: PipelineReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.zones.len(), 5);
    assert_eq!(parsed.schema, report.schema);
}

#[test]
fn test_run_from_files_writes_outputs() {
    let dir = TempDir::new().unwrap();
    let prices_path = dir.path().join("prices.csv");
    let output_dir = dir.path().join("out");

    let table = common::price_table(300, 8);
    let mut file = fs::File::create(&prices_path).unwrap();
    writeln!(file, "datetime,{}", common::ZONES.join(",")).unwrap();
    for (i, ts) in table.timestamps().iter().enumerate() {
        let values: Vec<String> = common::ZONES
            .iter()
            .map(|z| format!("{:.4}", table.column(z).unwrap()[i].unwrap()))
            .collect();
        writeln!(file, "{},{}", ts.format("%Y-%m-%d %H:%M:%S"), values.join(",")).unwrap();
    }
    file.flush().unwrap();

    let mut config = small_config();
    config.data.prices_path = prices_path;
    config.data.output_dir = output_dir.clone();
    config.data.weather_path = Some(dir.path().join("missing_weather.csv"));

    let run = Pipeline::new(config).unwrap().run_from_files().unwrap();
    assert_eq!(run.succeeded().len(), 5);

    assert!(output_dir.join("features.csv").exists());
    assert!(output_dir.join("labels.csv").exists());
    let report: PipelineReport =
        serde_json::from_str(&fs::read_to_string(output_dir.join("report.json")).unwrap())
            .unwrap();
    assert_eq!(report.zones.len(), 5);
    assert!(!report.schema.columns().iter().any(|c| c == "temperature"));
}
