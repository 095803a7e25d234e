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

use crate::atmosphere::{true_airspeed, FPS_PER_KNOT};
use crate::errors::{CalibrationError, IllConditionedSnafu, TooFewSamplesSnafu};
use crate::estimator::CalibrationPoint;
use crate::geometry::FrameTransform;
use crate::linalg::{DMatrix, DVector, Matrix5, Vector3, Vector5};
use crate::solver::{AmbientSolution, AmbientSolver};
use snafu::ensure;
use std::fmt;

mod jacobian;
mod lm;

pub use lm::{LMSolution, LevenbergMarquardt};

/// Number of estimated parameters of a calibration point
pub const NUM_PARAMETERS: usize = 5;

/// Parameters estimated for each calibration point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CalibrationParameters {
    /// Pressure altitude bias at the first sample (ft)
    pub pa_bias_ft: f64,
    /// Wind velocity, north component (kts)
    pub wind_north_kts: f64,
    /// Wind velocity, east component (kts)
    pub wind_east_kts: f64,
    /// Wind velocity, down component (kts)
    pub wind_down_kts: f64,
    /// Temperature recovery factor correction
    pub eta: f64,
}

impl CalibrationParameters {
    /// Index of the pressure altitude bias in the parameter vector and covariance
    pub const PA_BIAS: usize = 0;
    /// Index of the temperature recovery correction in the parameter vector and covariance
    pub const ETA: usize = 4;

    pub fn from_vector(vec: &Vector5<f64>) -> Self {
        Self {
            pa_bias_ft: vec[0],
            wind_north_kts: vec[1],
            wind_east_kts: vec[2],
            wind_down_kts: vec[3],
            eta: vec[4],
        }
    }

    pub fn to_vector(&self) -> Vector5<f64> {
        Vector5::new(
            self.pa_bias_ft,
            self.wind_north_kts,
            self.wind_east_kts,
            self.wind_down_kts,
            self.eta,
        )
    }

    /// Wind velocity in the navigation frame (kts)
    pub fn wind(&self) -> Vector3<f64> {
        Vector3::new(self.wind_north_kts, self.wind_east_kts, self.wind_down_kts)
    }
}

impl fmt::Display for CalibrationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PA bias = {:.3} ft\twind (N, E, D) = ({:.3}, {:.3}, {:.3}) kts\teta = {:.5}",
            self.pa_bias_ft, self.wind_north_kts, self.wind_east_kts, self.wind_down_kts, self.eta
        )
    }
}

/// Nonlinear least squares fit of the [CalibrationParameters] of a single calibration point.
///
/// The residuals are the difference between the air relative velocity plus the wind, and the inertial velocity,
/// stacked as all the north components, then all the east components, and finally all the down components (kts).
pub struct CalibrationFit<'a> {
    point: &'a CalibrationPoint,
    frames: FrameTransform,
    ground_velocity_kts: Vec<Vector3<f64>>,
    solver: AmbientSolver,
}

/// Outcome of a [CalibrationFit].
#[derive(Clone, Debug, PartialEq)]
pub struct FitSolution {
    pub parameters: CalibrationParameters,
    /// Estimated covariance of the parameters, in the order of [CalibrationParameters::to_vector]
    pub covariance: Matrix5<f64>,
    /// Mean squared error of the residuals, i.e. the sum of squares over the degrees of freedom (kts²)
    pub mse: f64,
    /// Root mean square of the velocity residuals (kts)
    pub rms: f64,
    /// Number of Levenberg-Marquardt iterations
    pub iterations: usize,
}

impl<'a> CalibrationFit<'a> {
    pub fn new(point: &'a CalibrationPoint, solver: AmbientSolver) -> Result<Self, CalibrationError> {
        let frames = FrameTransform::from_point(point)?;
        let ground_velocity_kts = point
            .north_velocity
            .iter()
            .zip(&point.east_velocity)
            .zip(&point.down_velocity)
            .map(|((vn, ve), vd)| Vector3::new(*vn, *ve, *vd) / FPS_PER_KNOT)
            .collect();

        Ok(Self {
            point,
            frames,
            ground_velocity_kts,
            solver,
        })
    }

    /// Solves for the ambient pressure, OAT and Mach number of the point with the provided parameters
    pub fn ambient(&self, params: &CalibrationParameters) -> Result<AmbientSolution, CalibrationError> {
        self.solver.solve(
            &self.point.geometric_height,
            &self.point.total_pressure,
            &self.point.temperature,
            self.point.temperature_source,
            params.pa_bias_ft,
            params.eta,
        )
    }

    /// Velocity residuals (kts) for the provided parameters
    pub fn residuals(&self, params: &CalibrationParameters) -> Result<DVector<f64>, CalibrationError> {
        let sol = self.ambient(params)?;
        let tas = sol
            .mach
            .iter()
            .zip(&sol.oat)
            .map(|(mach, oat)| true_airspeed(*mach, *oat))
            .collect::<Vec<f64>>();

        let wind = params.wind();
        let num = self.frames.len();
        let mut resid = DVector::zeros(3 * num);
        for (i, (air_vel, gnd_vel)) in self
            .frames
            .airspeed_to_nav(&tas)
            .iter()
            .zip(&self.ground_velocity_kts)
            .enumerate()
        {
            let delta = air_vel + wind - gnd_vel;
            resid[i] = delta.x;
            resid[num + i] = delta.y;
            resid[2 * num + i] = delta.z;
        }
        Ok(resid)
    }

    /// Fits the calibration parameters starting from all zeros, and estimates their covariance.
    pub fn fit(&self, lm: &LevenbergMarquardt) -> Result<FitSolution, CalibrationError> {
        let num_resid = 3 * self.frames.len();
        ensure!(
            num_resid > NUM_PARAMETERS,
            TooFewSamplesSnafu {
                action: "calibration parameter fit",
                need: NUM_PARAMETERS,
                got: num_resid,
            }
        );

        let sol = lm.minimize(DVector::zeros(NUM_PARAMETERS), |x: &DVector<f64>| {
            self.residuals(&CalibrationParameters::from_vector(
                &x.fixed_rows::<NUM_PARAMETERS>(0).into_owned(),
            ))
        })?;

        let parameters =
            CalibrationParameters::from_vector(&sol.x.fixed_rows::<NUM_PARAMETERS>(0).into_owned());
        let (covariance, mse) = covariance_from_jacobian(&sol.jacobian, sol.cost)?;

        info!(
            "{}: {parameters} (RMS = {:.4} kts after {} iterations)",
            self.point.label,
            sol.rms(),
            sol.iterations
        );

        Ok(FitSolution {
            parameters,
            covariance,
            mse,
            rms: sol.rms(),
            iterations: sol.iterations,
        })
    }
}

/// Estimates the parameter covariance as mse·(JᵀJ)⁻¹ where mse is the sum of squared residuals over the degrees of
/// freedom. Returns the covariance and the mse.
///
/// `cost` is the plain sum of squares, so the covariance is twice that obtained from a cost of half the sum of squares.
///
/// A rank deficient Jacobian (e.g. a point flown on a single heading) makes the inverse meaningless, so the smallest
/// singular value is checked against max(m, n)·ε times the largest one before inverting.
pub fn covariance_from_jacobian(
    jacobian: &DMatrix<f64>,
    cost: f64,
) -> Result<(Matrix5<f64>, f64), CalibrationError> {
    let (num_resid, num_params) = jacobian.shape();
    ensure!(
        num_params == NUM_PARAMETERS && num_resid > num_params,
        TooFewSamplesSnafu {
            action: "covariance estimation",
            need: NUM_PARAMETERS,
            got: num_resid,
        }
    );

    let svd = jacobian.clone().svd(false, false);
    let sv_max = svd.singular_values.max();
    let sv_min = svd.singular_values.min();
    let threshold = sv_max * (num_resid.max(num_params) as f64) * f64::EPSILON;
    ensure!(
        sv_min > threshold,
        IllConditionedSnafu {
            action: "covariance estimation",
            details: format!(
                "Jacobian is rank deficient (singular values range from {sv_min:.3e} to {sv_max:.3e})"
            ),
        }
    );

    let normal = jacobian.transpose() * jacobian;
    let inv = match normal.cholesky() {
        Some(chol) => chol.inverse(),
        None => {
            return IllConditionedSnafu {
                action: "covariance estimation",
                details: "normal matrix is not positive definite".to_string(),
            }
            .fail()
        }
    };

    let mse = cost / (num_resid - num_params) as f64;
    let covariance = Matrix5::from_iterator(inv.iter().map(|v| v * mse));
    Ok((covariance, mse))
}
