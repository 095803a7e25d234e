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

use super::{
    airspeed_from_qc_over_psl, mach_from_qc_over_pa, pressure_altitude_from_delta,
    qc_over_pa_from_mach, standard_pressure, SEA_LEVEL_PRESSURE_PSI,
};
use crate::errors::{CalibrationError, LengthMismatchSnafu, TooFewSamplesSnafu};
use snafu::ensure;
use std::fmt;

/// Air data computer position corrections at a given indicated pressure altitude.
///
/// Each correction is the position corrected value minus the instrument corrected one, i.e. what must be added
/// to the indication to recover the true quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct AdcErrors {
    /// Indicated pressure altitude at which the corrections apply (ft)
    pub target_alt_ic_ft: f64,
    /// Altitude position correction ΔHpc (ft)
    pub altitude_ft: Vec<f64>,
    /// Calibrated airspeed position correction ΔVpc (kts)
    pub airspeed_kts: Vec<f64>,
    /// Mach position correction ΔMpc
    pub mach: Vec<f64>,
}

impl AdcErrors {
    /// Translates static position error ratios (ΔPp/Ps), observed at the provided instrument corrected Mach numbers,
    /// into altitude, airspeed and Mach corrections at the target indicated altitude.
    ///
    /// The total pressure is not affected by the static source error, so the impact pressure seen by the air data
    /// computer is rebuilt from the indicated static pressure and Mach, and then referenced to the true ambient pressure.
    pub fn from_spe(
        spe_ratio: &[f64],
        mach_ic: &[f64],
        target_alt_ic_ft: f64,
    ) -> Result<Self, CalibrationError> {
        ensure!(
            spe_ratio.len() == mach_ic.len(),
            LengthMismatchSnafu {
                action: "translating SPE ratios into air data errors",
                expected: spe_ratio.len(),
                got: mach_ic.len(),
            }
        );
        ensure!(
            !spe_ratio.is_empty(),
            TooFewSamplesSnafu {
                action: "translating SPE ratios into air data errors",
                need: 0_usize,
                got: 0_usize,
            }
        );

        let static_pres = standard_pressure(target_alt_ic_ft);
        let mut altitude_ft = Vec::with_capacity(spe_ratio.len());
        let mut airspeed_kts = Vec::with_capacity(spe_ratio.len());
        let mut mach = Vec::with_capacity(spe_ratio.len());

        for (spe, m_ic) in spe_ratio.iter().zip(mach_ic) {
            let qc_ic = static_pres * qc_over_pa_from_mach(*m_ic);
            let total_pres = static_pres + qc_ic;
            let amb_pres = static_pres * (1.0 - spe);
            let qc_pc = total_pres - amb_pres;

            let alt_pc = pressure_altitude_from_delta(amb_pres / SEA_LEVEL_PRESSURE_PSI);
            altitude_ft.push(alt_pc - target_alt_ic_ft);

            let v_ic = airspeed_from_qc_over_psl(qc_ic / SEA_LEVEL_PRESSURE_PSI)?;
            let v_pc = airspeed_from_qc_over_psl(qc_pc / SEA_LEVEL_PRESSURE_PSI)?;
            airspeed_kts.push(v_pc - v_ic);

            let m_pc = mach_from_qc_over_pa(qc_pc / amb_pres)?;
            mach.push(m_pc - m_ic);
        }

        Ok(Self {
            target_alt_ic_ft,
            altitude_ft,
            airspeed_kts,
            mach,
        })
    }
}

impl fmt::Display for AdcErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_abs = |v: &[f64]| v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        write!(
            f,
            "ADC errors at {:.0} ft PA: max |ΔHpc| = {:.1} ft, max |ΔVpc| = {:.2} kts, max |ΔMpc| = {:.4}",
            self.target_alt_ic_ft,
            max_abs(&self.altitude_ft),
            max_abs(&self.airspeed_kts),
            max_abs(&self.mach)
        )
    }
}

#[test]
fn no_spe_no_error() {
    let errors = AdcErrors::from_spe(&[0.0, 0.0], &[0.3, 0.8], 10_000.0).unwrap();
    for i in 0..2 {
        assert!(errors.altitude_ft[i].abs() < 1e-6);
        assert!(errors.airspeed_kts[i].abs() < 1e-6);
        assert!(errors.mach[i].abs() < 1e-9);
    }
}

#[test]
fn positive_spe_means_higher_altitude() {
    // Static source reads high: the true ambient pressure is lower, hence the true altitude higher
    // and the true impact pressure larger.
    let errors = AdcErrors::from_spe(&[0.01], &[0.5], 0.0).unwrap();
    assert!(errors.altitude_ft[0] > 0.0);
    assert!(errors.airspeed_kts[0] > 0.0);
    assert!(errors.mach[0] > 0.0);
    // Roughly 27 ft per hundredth of a psi near sea level
    assert!((errors.altitude_ft[0] - 270.0).abs() < 30.0);
}

#[test]
fn mismatched_lengths_are_rejected() {
    assert!(matches!(
        AdcErrors::from_spe(&[0.01, 0.02], &[0.5], 0.0),
        Err(CalibrationError::LengthMismatch {
            expected: 2,
            got: 1,
            ..
        })
    ));
    assert!(matches!(
        AdcErrors::from_spe(&[], &[], 0.0),
        Err(CalibrationError::TooFewSamples { got: 0, .. })
    ));
}
