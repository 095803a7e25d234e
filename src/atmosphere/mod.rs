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

//! Standard atmosphere and compressible flow relations.
//!
//! All functions are pure scalar functions: callers map them over sample arrays.
//! Pressures are in psi, altitudes in feet, temperatures in Kelvin and airspeeds in knots.
//!
//! References: Erb, Russell E. "Pitot-Statics Textbook." US Air Force Test Pilot School, Edwards AFB, CA (2020).

mod mach;
mod translate;

pub use mach::*;
pub use translate::AdcErrors;

/// Standard day sea level pressure (psi)
pub const SEA_LEVEL_PRESSURE_PSI: f64 = 14.695_948_8;
/// Standard day sea level temperature (K)
pub const SEA_LEVEL_TEMPERATURE_K: f64 = 288.15;
/// Standard day sea level speed of sound (kts)
pub const SEA_LEVEL_SPEED_OF_SOUND_KTS: f64 = 661.478_827_231_622;
/// Pressure altitude of the tropopause (ft)
pub const TROPOPAUSE_FT: f64 = 36_089.24;
/// Feet per second in one knot
pub const FPS_PER_KNOT: f64 = 1.6878;

/// Temperature lapse coefficient of the troposphere (1/ft)
const LAPSE_COEFF: f64 = 6.875_585_6e-6;
/// Pressure exponent of the troposphere
const PRESSURE_EXP: f64 = 5.255_879_7;
/// Pressure decay coefficient of the lower stratosphere (1/ft)
const STRATO_DECAY: f64 = 4.806_346e-5;
/// Temperature ratio in the lower stratosphere, constant by definition
pub const THETA_TROPOPAUSE: f64 = 1.0 - LAPSE_COEFF * TROPOPAUSE_FT;

fn delta_troposphere(pressure_alt_ft: f64) -> f64 {
    (1.0 - LAPSE_COEFF * pressure_alt_ft).powf(PRESSURE_EXP)
}

/// Pressure ratio at the tropopause, i.e. the boundary between both branches of the model
pub fn delta_tropopause() -> f64 {
    delta_troposphere(TROPOPAUSE_FT)
}

/// Returns the standard atmosphere pressure ratio P/P_SL at the provided pressure altitude.
pub fn delta_from_pressure_altitude(pressure_alt_ft: f64) -> f64 {
    if pressure_alt_ft <= TROPOPAUSE_FT {
        delta_troposphere(pressure_alt_ft)
    } else {
        delta_tropopause() * (-STRATO_DECAY * (pressure_alt_ft - TROPOPAUSE_FT)).exp()
    }
}

/// Returns the pressure altitude corresponding to the provided pressure ratio P/P_SL.
pub fn pressure_altitude_from_delta(delta: f64) -> f64 {
    let delta_trop = delta_tropopause();
    if delta >= delta_trop {
        (1.0 - delta.powf(1.0 / PRESSURE_EXP)) / LAPSE_COEFF
    } else {
        TROPOPAUSE_FT - (delta / delta_trop).ln() / STRATO_DECAY
    }
}

/// Returns the standard atmosphere temperature ratio T/T_SL at the provided pressure altitude.
pub fn theta_from_pressure_altitude(pressure_alt_ft: f64) -> f64 {
    if pressure_alt_ft <= TROPOPAUSE_FT {
        1.0 - LAPSE_COEFF * pressure_alt_ft
    } else {
        THETA_TROPOPAUSE
    }
}

/// Standard day temperature (K) at the provided pressure altitude
pub fn standard_temperature(pressure_alt_ft: f64) -> f64 {
    SEA_LEVEL_TEMPERATURE_K * theta_from_pressure_altitude(pressure_alt_ft)
}

/// Standard day ambient pressure (psi) at the provided pressure altitude
pub fn standard_pressure(pressure_alt_ft: f64) -> f64 {
    SEA_LEVEL_PRESSURE_PSI * delta_from_pressure_altitude(pressure_alt_ft)
}

/// True airspeed (kts) from Mach number and ambient temperature (K)
pub fn true_airspeed(mach: f64, oat_k: f64) -> f64 {
    mach * (oat_k / SEA_LEVEL_TEMPERATURE_K).sqrt() * SEA_LEVEL_SPEED_OF_SOUND_KTS
}

#[test]
fn sea_level_is_standard() {
    assert_eq!(delta_from_pressure_altitude(0.0), 1.0);
    assert_eq!(theta_from_pressure_altitude(0.0), 1.0);
    assert_eq!(pressure_altitude_from_delta(1.0), 0.0);
    assert!((standard_temperature(0.0) - 288.15).abs() < f64::EPSILON);
}

#[test]
fn tropopause_is_continuous() {
    let below = delta_from_pressure_altitude(TROPOPAUSE_FT - 1e-6);
    let above = delta_from_pressure_altitude(TROPOPAUSE_FT + 1e-6);
    assert!((below - above).abs() < 1e-10);
    // Reference value of the 1976 standard atmosphere
    assert!((delta_tropopause() - 0.223_36).abs() < 1e-4);
    assert!((THETA_TROPOPAUSE - 216.65 / 288.15).abs() < 1e-4);
    assert_eq!(theta_from_pressure_altitude(50_000.0), THETA_TROPOPAUSE);
    assert_eq!(theta_from_pressure_altitude(60_000.0), THETA_TROPOPAUSE);
}

#[test]
fn pressure_altitude_round_trip() {
    let mut alt_ft = -2_000.0;
    while alt_ft <= 65_000.0 {
        let delta = delta_from_pressure_altitude(alt_ft);
        let back = pressure_altitude_from_delta(delta);
        assert!(
            (back - alt_ft).abs() < 1e-6,
            "round trip failed at {alt_ft} ft: got {back}"
        );
        alt_ft += 250.0;
    }
    for alt_ft in [TROPOPAUSE_FT - 1e-3, TROPOPAUSE_FT, TROPOPAUSE_FT + 1e-3] {
        let back = pressure_altitude_from_delta(delta_from_pressure_altitude(alt_ft));
        assert!((back - alt_ft).abs() < 1e-6);
    }
}
