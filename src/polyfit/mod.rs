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

use crate::errors::{CalibrationError, IllConditionedSnafu, InvalidVarianceSnafu, TooFewSamplesSnafu};
use crate::estimator::CalibrationResult;
use crate::inference::chi2_scale;
use crate::linalg::{DMatrix, DVector};
use snafu::ensure;
use std::fmt;

/// Mach number above which the quadratic model is augmented with spline knots for the transonic region
pub const TRANSONIC_MACH: f64 = 0.9;
/// Default number of knots of the transonic spline, the last one (at the maximum Mach) is dropped
pub const DEFAULT_NUM_KNOTS: usize = 20;
/// Number of points of the Mach grid used for predictions
pub const MACH_GRID_SIZE: usize = 1000;

/// Returns `num` evenly spaced values over [start, end], both included.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Static position error ratio model as a function of the instrument corrected Mach number.
///
/// The model is a quadratic in Mach, augmented with truncated quadratic splines `max(0, M - k)²` at each knot `k`
/// when transonic data is available. It is fitted by weighted least squares across calibration points, where each
/// sample is weighted by the inverse of its one sigma SPE ratio variance, regardless of the significance level of
/// the calibration results.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeModel {
    betas: DVector<f64>,
    kernel: DMatrix<f64>,
    mse: f64,
    knots: Option<Vec<f64>>,
    mach_grid: Vec<f64>,
    num_samples: usize,
}

/// Predicted SPE ratio and its confidence half-width
#[derive(Clone, Debug, PartialEq)]
pub struct SpePrediction {
    pub mach: Vec<f64>,
    pub spe_ratio: Vec<f64>,
    pub ci: Vec<f64>,
}

impl SpeModel {
    /// Fits the SPE model on the non-turning samples of the provided results.
    ///
    /// If any Mach number exceeds [TRANSONIC_MACH], knots are appended: either those provided, or `num_knots`
    /// (default [DEFAULT_NUM_KNOTS]) evenly spaced from [TRANSONIC_MACH] to the maximum Mach, without the last one.
    pub fn fit(
        results: &[&CalibrationResult],
        knots: Option<Vec<f64>>,
        num_knots: Option<usize>,
    ) -> Result<Self, CalibrationError> {
        let mut machs = Vec::new();
        let mut spes = Vec::new();
        let mut variances = Vec::new();
        for result in results {
            for i in 0..result.mach_ic.len() {
                if !result.turning[i] {
                    machs.push(result.mach_ic[i]);
                    spes.push(result.spe_ratio[i]);
                    variances.push(result.spe_ratio_sigma[i].powi(2));
                }
            }
        }

        info!(
            "fitting SPE model on {} samples from {} calibration point(s)",
            machs.len(),
            results.len()
        );

        let weights = variances
            .iter()
            .enumerate()
            .map(|(index, variance)| {
                ensure!(
                    variance.is_finite() && *variance > 0.0,
                    InvalidVarianceSnafu {
                        index,
                        variance: *variance
                    }
                );
                Ok(1.0 / variance)
            })
            .collect::<Result<Vec<f64>, CalibrationError>>()?;

        let mach_min = machs.iter().copied().fold(f64::INFINITY, f64::min);
        let mach_max = machs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let knots = if mach_max > TRANSONIC_MACH {
            Some(knots.unwrap_or_else(|| {
                let mut knots = linspace(
                    TRANSONIC_MACH,
                    mach_max,
                    num_knots.unwrap_or(DEFAULT_NUM_KNOTS),
                );
                knots.pop();
                knots
            }))
        } else {
            None
        };

        let x_mat = design_matrix(&machs, knots.as_deref());
        let (num_samples, num_coeffs) = x_mat.shape();
        ensure!(
            num_samples > num_coeffs,
            TooFewSamplesSnafu {
                action: "SPE model fit",
                need: num_coeffs,
                got: num_samples,
            }
        );

        // W X, scaling each row by its weight
        let mut wx_mat = x_mat.clone();
        for (mut row, weight) in wx_mat.row_iter_mut().zip(&weights) {
            row *= *weight;
        }

        let y = DVector::from_vec(spes);
        let normal = wx_mat.transpose() * &x_mat;
        let kernel = match normal.cholesky() {
            Some(chol) => chol.inverse(),
            None => {
                return IllConditionedSnafu {
                    action: "SPE model fit",
                    details: format!(
                        "weighted normal matrix of {num_coeffs} coefficients is not positive definite"
                    ),
                }
                .fail()
            }
        };
        let betas = &kernel * (wx_mat.transpose() * &y);
        let residuals = &y - &x_mat * &betas;
        let mse = residuals.norm_squared() / (num_samples - num_coeffs) as f64;

        debug!("SPE model coefficients: {:.6e}", betas.transpose());

        Ok(Self {
            betas,
            kernel,
            mse,
            knots,
            mach_grid: linspace(mach_min, mach_max, MACH_GRID_SIZE),
            num_samples,
        })
    }

    /// Predicts the SPE ratio and its confidence half-width at the provided Mach numbers, or on the Mach grid
    /// spanning the data of the fit.
    ///
    /// Without a significance level `alpha`, the half-width is the standard error.
    pub fn predict(
        &self,
        mach: Option<&[f64]>,
        alpha: Option<f64>,
    ) -> Result<SpePrediction, CalibrationError> {
        let mach = mach.unwrap_or(self.mach_grid.as_slice()).to_vec();
        let scale = chi2_scale(alpha, 1.0)?.sqrt();
        let x_pred = design_matrix(&mach, self.knots.as_deref());

        let spe_ratio = (&x_pred * &self.betas).iter().copied().collect();
        let ci = x_pred
            .row_iter()
            .map(|row| {
                let var = (&row * &self.kernel).dot(&row) * self.mse;
                scale * var.max(0.0).sqrt()
            })
            .collect();

        Ok(SpePrediction {
            mach,
            spe_ratio,
            ci,
        })
    }

    /// Regression coefficients: constant, Mach, Mach², then one per knot
    pub fn betas(&self) -> &DVector<f64> {
        &self.betas
    }

    /// Covariance kernel (XᵀWX)⁻¹
    pub fn kernel(&self) -> &DMatrix<f64> {
        &self.kernel
    }

    pub fn mse(&self) -> f64 {
        self.mse
    }

    pub fn knots(&self) -> Option<&[f64]> {
        self.knots.as_deref()
    }

    pub fn mach_grid(&self) -> &[f64] {
        &self.mach_grid
    }

    /// Number of samples used in the fit
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }
}

impl fmt::Display for SpeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SPE model: {} coefficients, {} knots, {} samples, MSE = {:.3e}",
            self.betas.len(),
            self.knots.as_ref().map_or(0, |k| k.len()),
            self.num_samples,
            self.mse
        )
    }
}

/// Builds the [1, M, M², max(0, M - k)²...] regression matrix.
fn design_matrix(mach: &[f64], knots: Option<&[f64]>) -> DMatrix<f64> {
    let knots = knots.unwrap_or_default();
    DMatrix::from_fn(mach.len(), 3 + knots.len(), |i, j| match j {
        0 => 1.0,
        1 => mach[i],
        2 => mach[i].powi(2),
        _ => (mach[i] - knots[j - 3]).max(0.0).powi(2),
    })
}
