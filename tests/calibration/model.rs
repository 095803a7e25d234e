extern crate jmoss;
extern crate pretty_env_logger;

use crate::{config, spe_truth, Maneuver};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use jmoss::polyfit::linspace;
use jmoss::prelude::*;

fn calibrator_with(maneuvers: &[Maneuver]) -> Calibrator {
    calibrator_at(Some(0.05), maneuvers)
}

fn calibrator_at(alpha: Option<f64>, maneuvers: &[Maneuver]) -> Calibrator {
    let mut calibrator = Calibrator::new(config(alpha)).unwrap();
    for maneuver in maneuvers {
        calibrator.insert_point(maneuver.point()).unwrap();
    }
    let report = calibrator.process_points(None);
    assert!(report.is_success(), "{report}");
    calibrator
}

fn noisy(label: &str, mach_range: (f64, f64), seed: u128) -> Maneuver {
    let mut maneuver = Maneuver::new(label);
    maneuver.mach_range = mach_range;
    maneuver.velocity_noise_fps = 0.3;
    maneuver.seed = seed;
    maneuver
}

#[test]
fn subsonic_and_supersonic_model() {
    let _ = pretty_env_logger::try_init();

    let mut calibrator = calibrator_with(&[
        noisy("subsonic", (0.3, 0.6), 1),
        noisy("supersonic", (0.95, 1.3), 2),
    ]);
    assert_eq!(calibrator.num_results(), 2);

    let model = calibrator.fit_model(None, None, Some(5)).unwrap().clone();
    println!("{model}");

    // Knots are evenly spaced from Mach 0.9 to the maximum Mach, without the last one
    let max_mach = calibrator
        .results(None)
        .unwrap()
        .iter()
        .flat_map(|r| r.mach_ic.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let expected_knots = linspace(0.9, max_mach, 5);
    let knots = model.knots().unwrap();
    assert_eq!(knots.len(), 4);
    for (knot, expected) in knots.iter().zip(&expected_knots) {
        assert_abs_diff_eq!(*knot, *expected, epsilon = 1e-12);
    }
    assert_eq!(model.betas().len(), 3 + 4);
    assert_eq!(model.mach_grid().len(), 1000);
    assert_eq!(model.num_samples(), 300);

    // The model is continuous across the start of the transonic region
    let around = model
        .predict(Some(&[0.9 - 1e-9, 0.9, 0.9 + 1e-9]), Some(0.05))
        .unwrap();
    assert_abs_diff_eq!(around.spe_ratio[0], around.spe_ratio[2], epsilon = 1e-9);

    // And reproduces the SPE flown where there is data
    let check = [0.35, 0.45, 0.55, 1.0, 1.1, 1.25];
    let pred = model.predict(Some(&check), Some(0.05)).unwrap();
    for (i, mach) in check.iter().enumerate() {
        assert_abs_diff_eq!(pred.spe_ratio[i], spe_truth(*mach), epsilon = 2e-3);
        assert!(pred.ci[i] > 0.0);
    }

    // Default predictions span the data
    let grid = model.predict(None, None).unwrap();
    assert_eq!(grid.spe_ratio.len(), 1000);
    assert_abs_diff_eq!(grid.mach[999], max_mach, epsilon = 1e-12);
    let wider = model.predict(None, Some(0.01)).unwrap();
    for (one_sigma, ci) in grid.ci.iter().zip(&wider.ci) {
        assert!(ci > one_sigma);
    }

    assert_eq!(calibrator.model(), Some(&model));
}

#[test]
fn default_transonic_knots() {
    let mut calibrator = calibrator_with(&[
        noisy("subsonic", (0.3, 0.6), 1),
        noisy("supersonic", (0.95, 1.3), 2),
    ]);
    let model = calibrator.fit_model(None, None, None).unwrap();
    println!("{model}");

    let knots = model.knots().unwrap();
    assert_eq!(knots.len(), 19);
    assert_eq!(knots[0], 0.9);
    assert!(knots.windows(2).all(|k| k[1] > k[0]));
    assert_eq!(model.betas().len(), 22);
    assert_eq!(model.num_samples(), 300);

    let around = model
        .predict(Some(&[0.9 - 1e-9, 0.9, 0.9 + 1e-9]), None)
        .unwrap();
    assert_abs_diff_eq!(around.spe_ratio[0], around.spe_ratio[2], epsilon = 1e-9);
}

#[test]
fn model_ignores_significance_level() {
    let maneuvers = [
        noisy("subsonic", (0.3, 0.6), 7),
        noisy("supersonic", (0.95, 1.3), 8),
    ];
    let check = [0.5, 1.1];

    let mut standard_errors = Vec::new();
    let mut kernels = Vec::new();
    for alpha in [None, Some(0.05), Some(0.001)] {
        let mut calibrator = calibrator_at(alpha, &maneuvers);
        let result = calibrator.result("subsonic").unwrap();
        for (width, sigma) in result.spe_ratio_width.iter().zip(&result.spe_ratio_sigma) {
            match alpha {
                None => assert_eq!(width, sigma),
                Some(_) => assert!(width > sigma),
            }
        }

        let model = calibrator.fit_model(None, None, Some(5)).unwrap();
        standard_errors.push(model.predict(Some(&check), None).unwrap().ci);
        kernels.push(model.kernel()[(0, 0)]);
    }

    for i in 1..3 {
        assert_relative_eq!(kernels[i], kernels[0], max_relative = 1e-9);
        for j in 0..check.len() {
            assert_relative_eq!(standard_errors[i][j], standard_errors[0][j], max_relative = 1e-9);
        }
    }
}

#[test]
fn subsonic_model_has_no_knots() {
    let mut calibrator = calibrator_with(&[
        noisy("slow", (0.3, 0.5), 3),
        noisy("fast", (0.5, 0.8), 4),
    ]);
    let model = calibrator.fit_model(Some(&["slow", "fast"]), None, None).unwrap();
    assert!(model.knots().is_none());
    assert_eq!(model.betas().len(), 3);

    let pred = model.predict(Some(&[0.4, 0.7]), None).unwrap();
    assert_abs_diff_eq!(pred.spe_ratio[0], spe_truth(0.4), epsilon = 1e-3);
    assert_abs_diff_eq!(pred.spe_ratio[1], spe_truth(0.7), epsilon = 1e-3);
}

#[test]
fn turning_samples_are_excluded() {
    let mut turning = noisy("turning", (0.3, 0.7), 5);
    turning.turn_samples = 30;

    let mut result = {
        let calibrator = calibrator_with(&[turning.clone()]);
        let result = calibrator.result("turning").unwrap().clone();
        assert_eq!(result.turning.iter().filter(|t| **t).count(), 30);
        assert!(result.turning[149] && !result.turning[119]);

        let summary = calibrator.point_summary("turning").unwrap();
        println!("{summary}");
        assert!(summary.turn_mach.unwrap() > 0.6);
        result
    };

    let baseline = SpeModel::fit(&[&result], None, None).unwrap();
    assert_eq!(baseline.num_samples(), 120);

    // Corrupting the SPE of the turning samples does not change the model
    for i in 120..150 {
        result.spe_ratio[i] += 0.05;
    }
    let corrupted = SpeModel::fit(&[&result], None, None).unwrap();
    assert_eq!(baseline.betas(), corrupted.betas());

    // Unless the turning samples are used
    result.turning = vec![false; result.len()];
    let unmasked = SpeModel::fit(&[&result], None, None).unwrap();
    assert_eq!(unmasked.num_samples(), 150);
    assert!((unmasked.betas() - baseline.betas()).amax() > 1e-6);
}

#[test]
fn adc_errors_of_result() {
    let calibrator = calibrator_with(&[noisy("adc", (0.3, 0.6), 6)]);
    let result = calibrator.result("adc").unwrap();
    let errors = result.adc_errors(10_000.0).unwrap();
    println!("{errors}");
    assert_eq!(errors.altitude_ft.len(), result.len());
    // Positive SPE everywhere: the static source reads high, the altimeter reads low
    for (spe, dh) in result.spe_ratio.iter().zip(&errors.altitude_ft) {
        assert!(*spe > 0.0);
        assert!(*dh > 0.0);
    }
}
