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

use super::{CalibrationPoint, CalibratorConfig};
use crate::atmosphere::AdcErrors;
use crate::errors::CalibrationError;
use crate::inference::generate_inferences;
use crate::linalg::{Matrix5, Vector3};
use crate::od::{CalibrationFit, CalibrationParameters};
use std::fmt;

/// Calibration of a single point: the fitted parameters, the resulting air data, and their confidence intervals.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
    pub label: String,
    /// Ambient pressure (psi)
    pub ambient_pressure: Vec<f64>,
    /// Static pressure of the source under calibration (psi)
    pub static_pressure: Vec<f64>,
    /// Outside air temperature (K)
    pub oat: Vec<f64>,
    /// Position corrected Mach number
    pub mach_pc: Vec<f64>,
    /// Instrument corrected Mach number
    pub mach_ic: Vec<f64>,
    /// Static position error ratio (Ps - Pa) / Ps
    pub spe_ratio: Vec<f64>,
    /// Angle of attack vane (rad)
    pub angle_of_attack: Vec<f64>,
    /// Samples flown in a turn, excluded from the SPE model
    pub turning: Vec<bool>,
    pub parameters: CalibrationParameters,
    /// Covariance of the parameters, in the order of [CalibrationParameters::to_vector]
    pub covariance: Matrix5<f64>,
    /// Confidence half-width of the SPE ratio, per sample
    pub spe_ratio_width: Vec<f64>,
    /// One sigma half-width of the SPE ratio, per sample, used to weight the SPE model
    pub spe_ratio_sigma: Vec<f64>,
    /// Confidence half-width of the OAT, per sample (K)
    pub oat_width: Vec<f64>,
    /// Confidence half-width of the wind, per axis (kts)
    pub wind_width: Vector3<f64>,
    /// Confidence half-width of the temperature recovery correction
    pub eta_width: f64,
    /// Significance level of the confidence intervals, one sigma if unset
    pub alpha: Option<f64>,
    /// Levenberg-Marquardt iterations
    pub iterations: usize,
    /// Root mean square of the velocity residuals (kts)
    pub rms: f64,
}

fn bounds(estimate: &[f64], width: &[f64]) -> (Vec<f64>, Vec<f64>) {
    estimate
        .iter()
        .zip(width)
        .map(|(est, w)| (est - w, est + w))
        .unzip()
}

impl CalibrationResult {
    /// Fits the calibration parameters of the point, and propagates their covariance into confidence intervals.
    pub fn new(point: &CalibrationPoint, config: &CalibratorConfig) -> Result<Self, CalibrationError> {
        let fit = CalibrationFit::new(point, config.solver)?;
        let solution = fit.fit(&config.lm)?;
        let parameters = solution.parameters;

        let ambient = fit.ambient(&parameters)?;
        let mach_ic = point.mach_ic()?;
        let spe_ratio = point
            .static_pressure
            .iter()
            .zip(&ambient.ambient_pressure)
            .map(|(ps, pa)| (ps - pa) / ps)
            .collect();

        let inferences = generate_inferences(
            point,
            &config.solver,
            &parameters,
            &solution.covariance,
            config.alpha,
        )?;

        Ok(Self {
            label: point.label.clone(),
            ambient_pressure: ambient.ambient_pressure,
            static_pressure: point.static_pressure.clone(),
            oat: ambient.oat,
            mach_pc: ambient.mach,
            mach_ic,
            spe_ratio,
            angle_of_attack: point.angle_of_attack.clone(),
            turning: point.turning(config.turn_mask_deg),
            parameters,
            covariance: solution.covariance,
            spe_ratio_width: inferences.spe_ratio,
            spe_ratio_sigma: inferences.spe_ratio_sigma,
            oat_width: inferences.oat,
            wind_width: inferences.wind,
            eta_width: inferences.eta,
            alpha: config.alpha,
            iterations: solution.iterations,
            rms: solution.rms,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.spe_ratio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spe_ratio.is_empty()
    }

    /// Lower and upper bounds of the SPE ratio
    pub fn spe_ratio_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        bounds(&self.spe_ratio, &self.spe_ratio_width)
    }

    /// Lower and upper bounds of the outside air temperature (K)
    pub fn oat_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        bounds(&self.oat, &self.oat_width)
    }

    /// Lower and upper bounds of the wind (kts)
    pub fn wind_bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        let wind = self.parameters.wind();
        (wind - self.wind_width, wind + self.wind_width)
    }

    /// Lower and upper bounds of the temperature recovery correction
    pub fn eta_bounds(&self) -> (f64, f64) {
        (
            self.parameters.eta - self.eta_width,
            self.parameters.eta + self.eta_width,
        )
    }

    /// Translates the static position error of this point into air data computer corrections at the provided
    /// indicated pressure altitude (ft).
    pub fn adc_errors(&self, target_alt_ic_ft: f64) -> Result<AdcErrors, CalibrationError> {
        AdcErrors::from_spe(&self.spe_ratio, &self.mach_ic, target_alt_ic_ft)
    }
}

impl fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let confidence = match self.alpha {
            Some(alpha) => format!("{:.1}%", 100.0 * (1.0 - alpha)),
            None => "1σ".to_string(),
        };
        writeln!(f, "Calibration result of `{}`", self.label)?;
        writeln!(f, "\t{}", self.parameters)?;
        writeln!(
            f,
            "\t{confidence} wind = ±({:.3}, {:.3}, {:.3}) kts\teta = ±{:.5}",
            self.wind_width.x, self.wind_width.y, self.wind_width.z, self.eta_width
        )?;
        write!(
            f,
            "\tRMS = {:.4} kts after {} iterations",
            self.rms, self.iterations
        )
    }
}

#[test]
fn bounds_enclose_estimate() {
    let (low, high) = bounds(&[0.5, -1.0], &[0.25, 0.0]);
    assert_eq!(low, vec![0.25, -1.0]);
    assert_eq!(high, vec![0.75, -1.0]);
}
