extern crate jmoss;

use approx::assert_abs_diff_eq;
use jmoss::prelude::*;
use rstest::*;

/// Climb from 10,000 ft to 14,000 ft of pressure altitude on a hot day.
struct Climb {
    press_alt: Vec<f64>,
    oat: Vec<f64>,
    mach: Vec<f64>,
    height: Vec<f64>,
    total_pressure: Vec<f64>,
    temperature: Vec<f64>,
    pa_bias: f64,
    eta: f64,
}

#[fixture]
fn climb() -> Climb {
    let n = 120;
    let pa_bias = -80.0;
    let eta = 0.015;
    let delta_isa = 12.0;

    let press_alt = (0..n)
        .map(|i| 10_000.0 + 4_000.0 * f64::from(i) / f64::from(n - 1))
        .collect::<Vec<f64>>();
    let oat = press_alt
        .iter()
        .map(|hp| standard_temperature(*hp) + delta_isa)
        .collect::<Vec<f64>>();
    let mach = (0..n)
        .map(|i| 0.7 - 0.2 * f64::from(i) / f64::from(n - 1))
        .collect::<Vec<f64>>();

    // Geometric height from the hydrostatic equation, integrated backward with the trapezoidal rule
    let ratio = press_alt
        .iter()
        .zip(&oat)
        .map(|(hp, t)| standard_temperature(*hp) / t)
        .collect::<Vec<f64>>();
    let mut height = vec![press_alt[0] - pa_bias];
    for i in 1..press_alt.len() {
        let step = (press_alt[i] - press_alt[i - 1]) / (0.5 * (ratio[i - 1] + ratio[i]));
        height.push(height[i - 1] + step);
    }

    let total_pressure = press_alt
        .iter()
        .zip(&mach)
        .map(|(hp, m)| standard_pressure(*hp) * (1.0 + qc_over_pa_from_mach(*m)))
        .collect();
    let temperature = oat
        .iter()
        .zip(&mach)
        .map(|(t, m)| t * (1.0 + 0.2 * (1.0 + eta) * m.powi(2)))
        .collect();

    Climb {
        press_alt,
        oat,
        mach,
        height,
        total_pressure,
        temperature,
        pa_bias,
        eta,
    }
}

#[rstest]
fn climb_converges_to_truth(climb: Climb) {
    let _ = pretty_env_logger::try_init();

    let sol = AmbientSolver::default()
        .solve(
            &climb.height,
            &climb.total_pressure,
            &climb.temperature,
            TemperatureSource::Total,
            climb.pa_bias,
            climb.eta,
        )
        .unwrap();

    assert!(sol.iterations <= 20, "{} iterations", sol.iterations);
    for i in 0..climb.height.len() {
        assert_abs_diff_eq!(sol.pressure_altitude[i], climb.press_alt[i], epsilon = 0.5);
        assert_abs_diff_eq!(sol.oat[i], climb.oat[i], epsilon = 1e-2);
        assert_abs_diff_eq!(sol.mach[i], climb.mach[i], epsilon = 1e-4);
        assert_abs_diff_eq!(
            sol.ambient_pressure[i],
            standard_pressure(climb.press_alt[i]),
            epsilon = 1e-4
        );
    }
}

#[rstest]
fn iteration_cap_is_an_error(climb: Climb) {
    let solver = AmbientSolver::builder().max_iterations(1).build();
    let res = solver.solve(
        &climb.height,
        &climb.total_pressure,
        &climb.temperature,
        TemperatureSource::Total,
        climb.pa_bias,
        climb.eta,
    );
    assert!(matches!(
        res,
        Err(CalibrationError::MaxIterations { iterations: 1, .. })
    ));
}

#[rstest]
#[case(0.0)]
#[case(250.0)]
#[case(-400.0)]
fn bias_shifts_pressure_altitude(climb: Climb, #[case] extra_bias: f64) {
    // Level flight: the pressure altitude is the biased geometric height on every sample
    let n = climb.height.len();
    let height = vec![12_000.0; n];
    let sol = AmbientSolver::default()
        .solve(
            &height,
            &climb.total_pressure,
            &climb.temperature,
            TemperatureSource::Total,
            extra_bias,
            0.0,
        )
        .unwrap();
    for hp in &sol.pressure_altitude {
        assert_abs_diff_eq!(*hp, 12_000.0 + extra_bias, epsilon = 1e-9);
    }
}
