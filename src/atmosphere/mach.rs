/*
    JMOSS, air data system calibration
    Copyright (C) 2026 The JMOSS developers

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use super::SEA_LEVEL_SPEED_OF_SOUND_KTS;
use crate::errors::{CalibrationError, MaxIterationsSnafu, NoMachRootSnafu};
use snafu::ensure;

/// Impact pressure ratio qc/Pa at Mach 1, boundary between the subsonic and the Rayleigh pitot relations
pub const SONIC_QC_OVER_PA: f64 = 0.89293;
/// Coefficient of the Rayleigh pitot formula, written as an implicit equation in Mach
const RAYLEIGH_COEFF: f64 = 0.881_284;
/// Bracket of the supersonic root search, and its fallback
const SUPERSONIC_BRACKET: (f64, f64) = (1.0, 3.0);
const FALLBACK_BRACKET: (f64, f64) = (0.8, 3.0);
const BRENT_MAX_ITER: usize = 100;
const BRENT_XTOL: f64 = 1e-14;
const ENDPOINT_TOL: f64 = 1e-12;

fn rayleigh_residual(mach: f64, qc_over_pa: f64) -> f64 {
    mach - RAYLEIGH_COEFF
        * ((qc_over_pa + 1.0) * (1.0 - 1.0 / (7.0 * mach.powi(2))).powf(2.5)).sqrt()
}

/// Returns the Mach number from the impact pressure ratio qc/Pa.
///
/// Below [SONIC_QC_OVER_PA] the subsonic isentropic relation is inverted in closed form.
/// Above it, the Rayleigh pitot relation has no closed form inverse and is solved with a Brent solver,
/// first in the [1, 3] bracket and then in the [0.8, 3] bracket. An error is returned if neither bracket
/// contains a root.
pub fn mach_from_qc_over_pa(qc_over_pa: f64) -> Result<f64, CalibrationError> {
    let ratio = qc_over_pa.abs();
    if ratio <= SONIC_QC_OVER_PA {
        return Ok((5.0 * ((ratio + 1.0).powf(2.0 / 7.0) - 1.0)).sqrt());
    }

    let func = |mach: f64| rayleigh_residual(mach, ratio);
    for (lower, upper) in [SUPERSONIC_BRACKET, FALLBACK_BRACKET] {
        let (y_lower, y_upper) = (func(lower), func(upper));
        // Round-off may push a root sitting on the edge of the bracket just outside of it
        if y_lower.abs() <= ENDPOINT_TOL {
            return Ok(lower);
        } else if y_upper.abs() <= ENDPOINT_TOL {
            return Ok(upper);
        } else if y_lower * y_upper < 0.0 {
            return brent(func, lower, upper);
        }
    }

    NoMachRootSnafu { qc_over_pa }.fail()
}

/// Returns the impact pressure ratio qc/Pa of the provided Mach number.
pub fn qc_over_pa_from_mach(mach: f64) -> f64 {
    let mach = mach.abs();
    if mach <= 1.0 {
        (1.0 + 0.2 * mach.powi(2)).powf(3.5) - 1.0
    } else {
        // Rayleigh pitot formula, consistent with the implicit form used in `mach_from_qc_over_pa`
        let coeff = 7.0_f64.powf(2.5) / RAYLEIGH_COEFF.powi(2);
        coeff * mach.powi(7) / (7.0 * mach.powi(2) - 1.0).powf(2.5) - 1.0
    }
}

/// Returns the calibrated airspeed (kts) from the impact pressure ratio qc/P_SL.
///
/// Calibrated airspeed is the speed at which a standard sea level day would produce the measured impact pressure,
/// so this follows the same branches as the Mach number conversion.
pub fn airspeed_from_qc_over_psl(qc_over_psl: f64) -> Result<f64, CalibrationError> {
    Ok(SEA_LEVEL_SPEED_OF_SOUND_KTS * mach_from_qc_over_pa(qc_over_psl)?)
}

/// Returns the impact pressure ratio qc/P_SL of the provided calibrated airspeed (kts).
pub fn qc_over_psl_from_airspeed(airspeed_kts: f64) -> f64 {
    qc_over_pa_from_mach(airspeed_kts / SEA_LEVEL_SPEED_OF_SOUND_KTS)
}

/// Brent root finder on a bracketed, sign changing function.
///
/// Same approach as the roots crate: https://docs.rs/roots/0.0.5/src/roots/numerical/brent.rs.html#57-131
fn brent<F: Fn(f64) -> f64>(func: F, lower: f64, upper: f64) -> Result<f64, CalibrationError> {
    let arrange = |a: f64, ya: f64, b: f64, yb: f64| {
        if ya.abs() > yb.abs() {
            (a, ya, b, yb)
        } else {
            (b, yb, a, ya)
        }
    };

    let (mut xa, mut ya, mut xb, mut yb) = arrange(lower, func(lower), upper, func(upper));
    if ya == 0.0 {
        return Ok(xa);
    }
    if yb == 0.0 {
        return Ok(xb);
    }

    let (mut xc, mut yc, mut xd) = (xa, ya, xa);
    let mut flag = true;

    for _ in 0..BRENT_MAX_ITER {
        if yb == 0.0 || (xa - xb).abs() <= BRENT_XTOL {
            return Ok(xb);
        }
        let mut s = if (ya - yc).abs() > f64::EPSILON && (yb - yc).abs() > f64::EPSILON {
            xa * yb * yc / ((ya - yb) * (ya - yc))
                + xb * ya * yc / ((yb - ya) * (yb - yc))
                + xc * ya * yb / ((yc - ya) * (yc - yb))
        } else {
            xb - yb * (xb - xa) / (yb - ya)
        };
        let cond1 = (s - xb) * (s - (3.0 * xa + xb) / 4.0) > 0.0;
        let cond2 = flag && (s - xb).abs() >= (xb - xc).abs() / 2.0;
        let cond3 = !flag && (s - xb).abs() >= (xc - xd).abs() / 2.0;
        let cond4 = flag && (xb - xc).abs() <= BRENT_XTOL;
        let cond5 = !flag && (xc - xd).abs() <= BRENT_XTOL;
        if cond1 || cond2 || cond3 || cond4 || cond5 {
            s = (xa + xb) / 2.0;
            flag = true;
        } else {
            flag = false;
        }
        let ys = func(s);
        xd = xc;
        xc = xb;
        yc = yb;
        if ya * ys < 0.0 {
            (xa, ya, xb, yb) = arrange(xa, ya, s, ys);
        } else {
            (xa, ya, xb, yb) = arrange(s, ys, xb, yb);
        }
    }

    ensure!(
        (xa - xb).abs() <= BRENT_XTOL.sqrt(),
        MaxIterationsSnafu {
            action: "Brent solver",
            iterations: BRENT_MAX_ITER,
        }
    );
    Ok(xb)
}

#[test]
fn subsonic_closed_form() {
    assert_eq!(mach_from_qc_over_pa(0.0).unwrap(), 0.0);
    // Sign of the impact pressure is ignored
    let m = mach_from_qc_over_pa(0.3).unwrap();
    assert_eq!(m, mach_from_qc_over_pa(-0.3).unwrap());
    assert!((qc_over_pa_from_mach(m) - 0.3).abs() < 1e-12);
}

#[test]
fn sonic_boundary() {
    // Both branches meet at Mach 1
    let sonic = qc_over_pa_from_mach(1.0);
    assert!((sonic - SONIC_QC_OVER_PA).abs() < 1e-5);
    let just_above = qc_over_pa_from_mach(1.0 + 1e-9);
    assert!((just_above - sonic).abs() < 1e-4);
    let m = mach_from_qc_over_pa(SONIC_QC_OVER_PA + 1e-6).unwrap();
    assert!((m - 1.0).abs() < 1e-4, "got {m}");
}

#[test]
fn mach_round_trip() {
    for i in 0..=300 {
        let mach = f64::from(i) * 0.01;
        let back = mach_from_qc_over_pa(qc_over_pa_from_mach(mach)).unwrap();
        assert!(
            (back - mach).abs() < 1e-9,
            "Mach round trip failed at {mach}: got {back}"
        );
    }
}

#[test]
fn airspeed_round_trip() {
    for airspeed in [0.0, 150.0, 400.0, 661.478_827_231_622, 900.0, 1_300.0] {
        let back = airspeed_from_qc_over_psl(qc_over_psl_from_airspeed(airspeed)).unwrap();
        assert!((back - airspeed).abs() < 1e-6, "{airspeed} kts -> {back} kts");
    }
}

#[test]
fn no_root_is_an_error() {
    // Far beyond Mach 3, neither bracket contains a root
    assert!(mach_from_qc_over_pa(1e3).is_err());
}
