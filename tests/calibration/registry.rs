extern crate jmoss;

use crate::{channel_names, config, Maneuver};
use jmoss::prelude::*;

fn calibrator() -> Calibrator {
    Calibrator::new(config(Some(0.05))).unwrap()
}

#[test]
fn exactly_one_temperature_channel() {
    let mut cfg = config(Some(0.05));
    cfg.channels.ambient_temperature = Some("OAT".to_string());
    assert!(matches!(
        Calibrator::new(cfg.clone()),
        Err(CalibrationError::AmbiguousTemperatureSource)
    ));

    cfg.channels.total_temperature = None;
    cfg.channels.ambient_temperature = None;
    assert!(matches!(
        Calibrator::new(cfg.clone()),
        Err(CalibrationError::MissingTemperatureSource)
    ));

    cfg.channels.ambient_temperature = Some("OAT".to_string());
    let calibrator = Calibrator::new(cfg).unwrap();
    assert_eq!(calibrator.temperature_source(), TemperatureSource::Ambient);
}

#[test]
fn invalid_configuration() {
    let mut cfg = config(Some(0.05));
    cfg.alpha = Some(0.0);
    assert!(matches!(
        Calibrator::new(cfg),
        Err(CalibrationError::Config {
            source: ConfigError::InvalidConfig { .. }
        })
    ));

    assert!(matches!(
        Calibrator::from_config_file("./data/does_not_exist.yaml"),
        Err(CalibrationError::Config {
            source: ConfigError::ReadError { .. }
        })
    ));
}

#[test]
fn config_file_round_trip() {
    let cfg = config(None);
    let path = std::env::temp_dir().join("jmoss_registry_config.yaml");
    std::fs::write(&path, cfg.dumps().unwrap()).unwrap();

    let calibrator = Calibrator::from_config_file(&path).unwrap();
    assert_eq!(calibrator.config(), &cfg);
    assert_eq!(calibrator.config().alpha, None);
    assert_eq!(calibrator.temperature_source(), TemperatureSource::Total);
}

#[test]
fn add_point_from_columns() {
    let maneuver = Maneuver::new("wind-up turn");
    let mut calibrator = calibrator();
    calibrator.add_point("wind-up turn", &maneuver.columns()).unwrap();

    assert_eq!(calibrator.num_points(), 1);
    assert_eq!(calibrator.point_labels(), vec!["wind-up turn"]);
    assert_eq!(calibrator.point("wind-up turn").unwrap(), &maneuver.point());

    // Labels are unique, and a rejected point leaves the registry untouched
    assert!(matches!(
        calibrator.add_point("wind-up turn", &maneuver.columns()),
        Err(CalibrationError::DuplicatePoint { .. })
    ));
    assert!(matches!(
        calibrator.insert_point(maneuver.point()),
        Err(CalibrationError::DuplicatePoint { .. })
    ));
    assert_eq!(calibrator.num_points(), 1);

    let summary = calibrator.point_summary("wind-up turn").unwrap();
    assert_eq!(summary.num_samples, 150);
    assert_eq!(summary.turn_mach, None);
    assert_eq!(summary.height_tolerance_ft, 0.0);
    assert!(summary.min_mach < summary.max_mach);
}

#[test]
fn time_channel_is_optional() {
    let maneuver = Maneuver::new("untimed");
    let mut columns = maneuver.columns();
    columns.remove("TIME");

    let mut cfg = config(Some(0.05));
    cfg.channels.time = None;
    let mut calibrator = Calibrator::new(cfg).unwrap();
    calibrator.add_point("untimed", &columns).unwrap();
    assert_eq!(calibrator.point("untimed").unwrap().time, None);

    // But it is required once named
    assert!(matches!(
        CalibrationPoint::from_columns("untimed", &channel_names(), &columns),
        Err(CalibrationError::MissingColumn {
            channel: Channel::Time,
            ..
        })
    ));
}

#[test]
fn missing_column() {
    let mut columns = Maneuver::new("no static").columns();
    columns.remove("PS");

    let mut calibrator = calibrator();
    match calibrator.add_point("no static", &columns) {
        Err(CalibrationError::MissingColumn {
            label,
            channel,
            column,
        }) => {
            assert_eq!(label, "no static");
            assert_eq!(channel, Channel::StaticPressure);
            assert_eq!(column, "PS");
        }
        other => panic!("expected a missing column, got {other:?}"),
    }
    assert_eq!(calibrator.num_points(), 0);
}

#[test]
fn mismatched_length() {
    let mut columns = Maneuver::new("short roll").columns();
    columns.get_mut("ROLL").unwrap().pop();

    let mut calibrator = calibrator();
    match calibrator.add_point("short roll", &columns) {
        Err(CalibrationError::MismatchedLength {
            channel,
            expected,
            got,
            ..
        }) => {
            assert_eq!(channel, Channel::RollAngle);
            assert_eq!(expected, 150);
            assert_eq!(got, 149);
        }
        other => panic!("expected mismatched lengths, got {other:?}"),
    }

    let mut point = Maneuver::new("short heading").point();
    point.true_heading.truncate(10);
    assert!(matches!(
        calibrator.insert_point(point),
        Err(CalibrationError::MismatchedLength {
            channel: Channel::TrueHeading,
            ..
        })
    ));
    assert_eq!(calibrator.num_points(), 0);
}

#[test]
fn lookups() {
    let mut calibrator = calibrator();
    calibrator.insert_point(Maneuver::new("first").point()).unwrap();

    assert!(matches!(
        calibrator.point("second"),
        Err(CalibrationError::PointNotFound { .. })
    ));
    assert!(matches!(
        calibrator.result("second"),
        Err(CalibrationError::PointNotFound { .. })
    ));
    assert!(matches!(
        calibrator.result("first"),
        Err(CalibrationError::ResultNotFound { .. })
    ));
    assert!(matches!(
        calibrator.fit_model(None, None, None),
        Err(CalibrationError::ResultNotFound { .. })
    ));
    assert!(calibrator.model().is_none());

    // Processing again replaces the result
    let eta = calibrator.process_point("first").unwrap().parameters.eta;
    assert_eq!(calibrator.process_point("first").unwrap().parameters.eta, eta);
    assert_eq!(calibrator.num_results(), 1);
    assert_eq!(calibrator.result_labels(), vec!["first"]);
    assert_eq!(calibrator.results(None).unwrap().len(), 1);
}

#[test]
fn failures_do_not_stop_processing() {
    let mut calibrator = calibrator();
    calibrator.insert_point(Maneuver::new("good").point()).unwrap();

    // Hovering: no horizontal ground speed on the first sample
    let mut hover = Maneuver::new("hover").point();
    hover.north_velocity[0] = 0.0;
    hover.east_velocity[0] = 0.0;
    calibrator.insert_point(hover).unwrap();

    let report = calibrator.process_points(Some(&["good", "hover", "ghost"]));
    println!("{report}");
    assert!(!report.is_success());
    assert_eq!(report.processed, vec!["good".to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert!(matches!(
        report.failed["ghost"],
        CalibrationError::PointNotFound { .. }
    ));
    assert!(matches!(
        report.failed["hover"],
        CalibrationError::DegenerateFlightPath { index: 0 }
    ));

    assert!(calibrator.result("good").is_ok());
    assert!(matches!(
        calibrator.result("hover"),
        Err(CalibrationError::ResultNotFound { .. })
    ));
    assert_eq!(calibrator.num_results(), 1);
}
