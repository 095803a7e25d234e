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

use crate::atmosphere::{mach_from_qc_over_pa, standard_pressure, standard_temperature};
use crate::errors::{CalibrationError, MaxIterationsSnafu, NonFiniteSnafu, TooFewSamplesSnafu};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use typed_builder::TypedBuilder;

/// Kind of temperature sensor used for a calibration point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureSource {
    /// Total (stagnation) temperature, the outside air temperature is derived from it
    #[default]
    Total,
    /// Ambient (static) temperature
    Ambient,
}

impl TemperatureSource {
    /// Returns the recovery factor of the sensor for the provided correction `eta`.
    ///
    /// A total temperature sensor nominally recovers all of the compressibility heating (factor 1),
    /// an ambient sensor none of it (factor 0). `eta` is the fitted correction on top of that nominal value.
    pub fn recovery_factor(&self, eta: f64) -> f64 {
        match self {
            Self::Total => 1.0 + eta,
            Self::Ambient => eta,
        }
    }

    /// Outside air temperature from the sensor measurement at the provided Mach number
    pub fn outside_air_temperature(&self, measured_k: f64, mach: f64, eta: f64) -> f64 {
        measured_k / (1.0 + 0.2 * self.recovery_factor(eta) * mach.powi(2))
    }
}

impl fmt::Display for TemperatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Total => write!(f, "total temperature"),
            Self::Ambient => write!(f, "ambient temperature"),
        }
    }
}

/// Fixed-point solver of the coupled pressure altitude, outside air temperature and Mach number problem.
///
/// The ambient pressure follows from the pressure altitude, the Mach number from the ambient pressure, the
/// outside air temperature from the Mach number (compressibility correction of the sensor), and the pressure
/// altitude profile along the height series from the ratio of standard to actual temperature.
#[derive(Copy, Clone, Debug, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct AmbientSolver {
    /// Convergence threshold on the sum of squared changes of both the pressure altitude (ft²) and the OAT (K²)
    #[builder(default = 1e-3)]
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Maximum number of fixed-point iterations before failing
    #[builder(default = 100)]
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_max_iterations() -> usize {
    100
}

impl Default for AmbientSolver {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Converged solution of the [AmbientSolver], one entry per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct AmbientSolution {
    /// Pressure altitude (ft)
    pub pressure_altitude: Vec<f64>,
    /// Ambient pressure (psi)
    pub ambient_pressure: Vec<f64>,
    /// Outside air temperature (K)
    pub oat: Vec<f64>,
    /// Position corrected Mach number
    pub mach: Vec<f64>,
    /// Number of fixed-point iterations used
    pub iterations: usize,
}

impl AmbientSolution {
    /// Mean ambient pressure across all samples (psi)
    pub fn mean_ambient_pressure(&self) -> f64 {
        mean(&self.ambient_pressure)
    }

    /// Mean outside air temperature across all samples (K)
    pub fn mean_oat(&self) -> f64 {
        mean(&self.oat)
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl AmbientSolver {
    /// Solves for the ambient pressure, outside air temperature and Mach number of each sample.
    ///
    /// # Arguments
    /// + `height`: geometric height (ft)
    /// + `total_pressure`: total pressure (psi)
    /// + `temperature`: sensor temperature (K), interpreted according to `source`
    /// + `pa_bias`: pressure altitude bias (ft) added to the geometric height at the first sample
    /// + `eta`: temperature recovery factor correction
    pub fn solve(
        &self,
        height: &[f64],
        total_pressure: &[f64],
        temperature: &[f64],
        source: TemperatureSource,
        pa_bias: f64,
        eta: f64,
    ) -> Result<AmbientSolution, CalibrationError> {
        let num = height.len();
        ensure!(
            num > 0 && total_pressure.len() == num && temperature.len() == num,
            TooFewSamplesSnafu {
                action: "ambient pressure and OAT solver",
                need: 0_usize,
                got: num.min(total_pressure.len()).min(temperature.len()),
            }
        );
        ensure!(
            pa_bias.is_finite() && eta.is_finite(),
            NonFiniteSnafu {
                action: "ambient pressure and OAT solver inputs"
            }
        );

        let mut press_alt = height.iter().map(|h| h + pa_bias).collect::<Vec<f64>>();
        let (mut amb_pres, mut mach) = Self::pressure_and_mach(&press_alt, total_pressure)?;
        let mut oat = Self::oat_profile(&press_alt, &mach, temperature, source, eta);

        for iteration in 1..=self.max_iterations {
            let next_press_alt = Self::integrate_pressure_altitude(height, &press_alt, &oat, pa_bias);
            let (next_amb_pres, next_mach) =
                Self::pressure_and_mach(&next_press_alt, total_pressure)?;
            let next_oat = Self::oat_profile(&next_press_alt, &next_mach, temperature, source, eta);

            let d_press_alt = sum_sq_diff(&next_press_alt, &press_alt);
            let d_oat = sum_sq_diff(&next_oat, &oat);

            press_alt = next_press_alt;
            amb_pres = next_amb_pres;
            mach = next_mach;
            oat = next_oat;

            ensure!(
                d_press_alt.is_finite() && d_oat.is_finite(),
                NonFiniteSnafu {
                    action: "ambient pressure and OAT solver"
                }
            );

            if d_press_alt < self.tolerance && d_oat < self.tolerance {
                trace!("ambient solver converged in {iteration} iteration(s)");
                return Ok(AmbientSolution {
                    pressure_altitude: press_alt,
                    ambient_pressure: amb_pres,
                    oat,
                    mach,
                    iterations: iteration,
                });
            }
        }

        MaxIterationsSnafu {
            action: "ambient pressure and OAT solver",
            iterations: self.max_iterations,
        }
        .fail()
    }

    /// Ambient pressure from the standard atmosphere, and Mach number from the impact pressure ratio
    fn pressure_and_mach(
        press_alt: &[f64],
        total_pressure: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), CalibrationError> {
        let amb_pres = press_alt
            .iter()
            .map(|hp| standard_pressure(*hp))
            .collect::<Vec<f64>>();
        let mach = amb_pres
            .iter()
            .zip(total_pressure)
            .map(|(pa, pt)| mach_from_qc_over_pa((pt - pa) / pa))
            .collect::<Result<Vec<f64>, CalibrationError>>()?;
        Ok((amb_pres, mach))
    }

    /// Standard temperature profile shifted by the mean difference between the sensor derived OAT and the standard day
    fn oat_profile(
        press_alt: &[f64],
        mach: &[f64],
        temperature: &[f64],
        source: TemperatureSource,
        eta: f64,
    ) -> Vec<f64> {
        let std_temp = press_alt
            .iter()
            .map(|hp| standard_temperature(*hp))
            .collect::<Vec<f64>>();

        let bias = temperature
            .iter()
            .zip(mach)
            .zip(&std_temp)
            .map(|((t, m), t_std)| source.outside_air_temperature(*t, *m, eta) - t_std)
            .sum::<f64>()
            / temperature.len() as f64;

        std_temp.iter().map(|t_std| t_std + bias).collect()
    }

    /// Integrates the geometric height changes into pressure altitude changes, scaled by T_std/OAT (hydrostatic
    /// equilibrium), anchored at the biased first height sample.
    fn integrate_pressure_altitude(
        height: &[f64],
        press_alt: &[f64],
        oat: &[f64],
        pa_bias: f64,
    ) -> Vec<f64> {
        let ratio = press_alt
            .iter()
            .zip(oat)
            .map(|(hp, t)| standard_temperature(*hp) / t)
            .collect::<Vec<f64>>();

        let mut integrated = Vec::with_capacity(height.len());
        integrated.push(height[0] + pa_bias);
        for i in 1..height.len() {
            let step = 0.5 * (ratio[i - 1] + ratio[i]) * (height[i] - height[i - 1]);
            integrated.push(integrated[i - 1] + step);
        }
        integrated
    }
}

fn sum_sq_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
