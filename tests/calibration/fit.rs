extern crate jmoss;
extern crate pretty_env_logger;

use crate::{config, spe_truth, Maneuver};
use approx::assert_abs_diff_eq;
use jmoss::estimator::CalibrationResult;
use jmoss::od::CalibrationFit;
use jmoss::prelude::*;
use rstest::*;

#[rstest]
#[case(TemperatureSource::Total, (0.3, 0.6))]
#[case(TemperatureSource::Ambient, (0.3, 0.6))]
#[case(TemperatureSource::Total, (0.95, 1.3))]
fn noise_free_recovery(#[case] source: TemperatureSource, #[case] mach_range: (f64, f64)) {
    let _ = pretty_env_logger::try_init();

    let mut maneuver = Maneuver::new("level accel");
    maneuver.source = source;
    maneuver.mach_range = mach_range;
    let point = maneuver.point();

    let result = CalibrationResult::new(&point, &config(Some(0.05))).unwrap();
    println!("{result}");

    assert_abs_diff_eq!(result.parameters.pa_bias_ft, maneuver.pa_bias_ft, epsilon = 1e-2);
    assert_abs_diff_eq!(result.parameters.wind_north_kts, maneuver.wind_north_kts, epsilon = 1e-3);
    assert_abs_diff_eq!(result.parameters.wind_east_kts, maneuver.wind_east_kts, epsilon = 1e-3);
    assert_abs_diff_eq!(result.parameters.wind_down_kts, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.parameters.eta, maneuver.eta, epsilon = 1e-5);
    assert!(result.rms < 1e-4, "RMS = {}", result.rms);

    let mach = maneuver.mach();
    for i in 0..point.len() {
        assert_abs_diff_eq!(result.ambient_pressure[i], maneuver.ambient_pressure(), epsilon = 1e-6);
        assert_abs_diff_eq!(result.oat[i], maneuver.oat(), epsilon = 1e-4);
        assert_abs_diff_eq!(result.mach_pc[i], mach[i], epsilon = 1e-6);
        assert_abs_diff_eq!(result.spe_ratio[i], spe_truth(mach[i]), epsilon = 1e-6);
        assert!(!result.turning[i]);
    }
}

#[test]
fn residuals_vanish_at_truth() {
    let maneuver = Maneuver::new("truth");
    let point = maneuver.point();
    let fit = CalibrationFit::new(&point, AmbientSolver::default()).unwrap();

    let truth = CalibrationParameters {
        pa_bias_ft: maneuver.pa_bias_ft,
        wind_north_kts: maneuver.wind_north_kts,
        wind_east_kts: maneuver.wind_east_kts,
        wind_down_kts: 0.0,
        eta: maneuver.eta,
    };
    let resid = fit.residuals(&truth).unwrap();
    assert_eq!(resid.len(), 3 * point.len());
    assert!(resid.amax() < 1e-9, "max residual {}", resid.amax());

    // A bias on the wind shows up on every sample of its axis only
    let mut windy = truth;
    windy.wind_east_kts += 1.0;
    let resid = fit.residuals(&windy).unwrap();
    let n = point.len();
    for i in 0..n {
        assert!(resid[i].abs() < 1e-9);
        assert_abs_diff_eq!(resid[n + i], 1.0, epsilon = 1e-9);
        assert!(resid[2 * n + i].abs() < 1e-9);
    }
}

/// Estimates must fall within their confidence intervals at the expected rate under Gaussian noise.
#[test]
fn confidence_interval_coverage() {
    let _ = pretty_env_logger::try_init();

    let cfg = config(Some(0.01));
    let mut checks = 0;
    let mut covered = 0;
    for seed in 0..10 {
        let mut maneuver = Maneuver::new("noisy");
        maneuver.velocity_noise_fps = 1.0;
        maneuver.seed = seed;
        let result = CalibrationResult::new(&maneuver.point(), &cfg).unwrap();

        let errors_and_widths = [
            (
                result.parameters.wind_north_kts - maneuver.wind_north_kts,
                result.wind_width.x,
            ),
            (
                result.parameters.wind_east_kts - maneuver.wind_east_kts,
                result.wind_width.y,
            ),
            (result.parameters.eta - maneuver.eta, result.eta_width),
            (
                result.spe_ratio[0] - spe_truth(maneuver.mach_range.0),
                result.spe_ratio_width[0],
            ),
        ];
        for (error, width) in errors_and_widths {
            assert!(width > 0.0);
            checks += 1;
            if error.abs() <= width {
                covered += 1;
            }
        }
    }
    println!("{covered} of {checks} estimates within their 99% confidence interval");
    assert!(covered >= 34, "only {covered} of {checks} estimates covered");
}

#[test]
fn bounds_are_consistent() {
    let mut maneuver = Maneuver::new("bounds");
    maneuver.velocity_noise_fps = 0.5;
    maneuver.seed = 7;
    let result = CalibrationResult::new(&maneuver.point(), &config(Some(0.05))).unwrap();

    let (spe_low, spe_high) = result.spe_ratio_bounds();
    let (oat_low, oat_high) = result.oat_bounds();
    for i in 0..result.len() {
        assert!(spe_low[i] <= result.spe_ratio[i] && result.spe_ratio[i] <= spe_high[i]);
        assert!(oat_low[i] <= result.oat[i] && result.oat[i] <= oat_high[i]);
    }

    let (wind_low, wind_high) = result.wind_bounds();
    let wind = result.parameters.wind();
    for axis in 0..3 {
        assert!(wind_low[axis] <= wind[axis] && wind[axis] <= wind_high[axis]);
    }
    let (eta_low, eta_high) = result.eta_bounds();
    assert!(eta_low <= result.parameters.eta && result.parameters.eta <= eta_high);

    // Covariance is symmetric and the variances positive
    for i in 0..5 {
        assert!(result.covariance[(i, i)] > 0.0);
        for j in 0..5 {
            assert_abs_diff_eq!(
                result.covariance[(i, j)],
                result.covariance[(j, i)],
                epsilon = 1e-12 * result.covariance[(i, i)].max(result.covariance[(j, j)])
            );
        }
    }
}

#[test]
fn intervals_widen_with_confidence() {
    let mut maneuver = Maneuver::new("widening");
    maneuver.velocity_noise_fps = 0.5;
    maneuver.seed = 11;
    let point = maneuver.point();

    let loose = CalibrationResult::new(&point, &config(Some(0.10))).unwrap();
    let strict = CalibrationResult::new(&point, &config(Some(0.01))).unwrap();
    let one_sigma = CalibrationResult::new(&point, &config(None)).unwrap();

    // Same fit, only the intervals change
    assert_eq!(loose.parameters, strict.parameters);
    assert_eq!(loose.spe_ratio, strict.spe_ratio);

    for axis in 0..3 {
        assert!(strict.wind_width[axis] > loose.wind_width[axis]);
        assert!(loose.wind_width[axis] > one_sigma.wind_width[axis]);
    }
    assert!(strict.eta_width > loose.eta_width);
    for i in 0..point.len() {
        assert!(strict.spe_ratio_width[i] > loose.spe_ratio_width[i]);
        assert!(strict.oat_width[i] > loose.oat_width[i]);
    }
}

#[test]
fn single_heading_is_ill_conditioned() {
    // Flying a single heading at a single speed cannot separate the wind from the airspeed errors
    let mut maneuver = Maneuver::new("straight");
    maneuver.mach_range = (0.5, 0.5);
    let mut point = maneuver.point();
    let n = point.len();
    let tas = jmoss::atmosphere::true_airspeed(0.5, maneuver.oat());
    point.true_heading = vec![0.0; n];
    point.north_velocity = vec![(tas + maneuver.wind_north_kts) * FPS_PER_KNOT; n];
    point.east_velocity = vec![maneuver.wind_east_kts * FPS_PER_KNOT; n];

    assert!(matches!(
        CalibrationResult::new(&point, &config(Some(0.05))),
        Err(CalibrationError::IllConditioned { .. })
    ));
}
