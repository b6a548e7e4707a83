use price_math::MathError;
use std::io;
use zone_forecast::error::ForecastError;

#[test]
fn test_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
    assert!(matches!(ForecastError::from(io_error), ForecastError::IoError(_)));

    let math_error = MathError::InvalidInput("period".to_string());
    assert!(matches!(
        ForecastError::from(math_error),
        ForecastError::MathError(_)
    ));

    let json_error = serde_json::from_str::<u32>("not json").unwrap_err();
    assert!(matches!(
        ForecastError::from(json_error),
        ForecastError::JsonError(_)
    ));
}

#[test]
fn test_error_display() {
    let error = ForecastError::DataInsufficient {
        zone: "NO2".to_string(),
        valid_points: 1,
    };
    let message = error.to_string();
    assert!(message.contains("NO2"));
    assert!(message.contains("found 1"));

    let error = ForecastError::InsufficientHistory {
        rows: 100,
        holdout: 720,
    };
    assert_eq!(
        error.to_string(),
        "Insufficient history: 100 rows available, holdout of 720 requested"
    );

    let error = ForecastError::from(io::Error::new(
        io::ErrorKind::PermissionDenied,
        "permission denied",
    ));
    let message = error.to_string();
    assert!(message.contains("IO error"));
    assert!(message.contains("permission denied"));
}

#[test]
fn test_client_errors() {
    assert!(ForecastError::UnknownZone("SE1".to_string()).is_client_error());
    assert!(ForecastError::SchemaMismatch {
        expected: 10,
        actual: 9
    }
    .is_client_error());

    assert!(!ForecastError::UndefinedMetric("mape".to_string()).is_client_error());
    assert!(!ForecastError::ConfigError("bad".to_string()).is_client_error());
    assert!(!ForecastError::DataInsufficient {
        zone: "NO1".to_string(),
        valid_points: 0
    }
    .is_client_error());
}

#[test]
fn test_result_mapping() {
    let result: Result<(), &str> = Err("singular design");
    let mapped = result.map_err(|e| ForecastError::ForecastingError(e.to_string()));

    if let Err(ForecastError::ForecastingError(msg)) = mapped {
        assert_eq!(msg, "singular design");
    } else {
        panic!("Wrong error variant");
    }
}
