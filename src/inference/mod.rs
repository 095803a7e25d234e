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

use crate::errors::{
    CalibrationError, CovarianceNotPsdSnafu, IllConditionedSnafu, InvalidSignificanceSnafu,
};
use crate::estimator::CalibrationPoint;
use crate::linalg::{Matrix2, Matrix5, Vector2, Vector3};
use crate::od::CalibrationParameters;
use crate::solver::{AmbientSolution, AmbientSolver};
use rayon::prelude::*;
use snafu::ensure;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Relative tolerance under which a negative eigenvalue of a covariance is considered round-off
const PSD_TOLERANCE: f64 = 1e-12;

/// Returns the scaling of a covariance to the confidence region of significance level `alpha`, with `dof` degrees of
/// freedom: the 1 - alpha quantile of the χ² distribution.
///
/// Without a significance level, the covariance is used as is (one sigma).
pub fn chi2_scale(alpha: Option<f64>, dof: f64) -> Result<f64, CalibrationError> {
    match alpha {
        None => Ok(1.0),
        Some(alpha) => {
            ensure!(
                alpha > 0.0 && alpha < 1.0,
                InvalidSignificanceSnafu { alpha }
            );
            let dist = ChiSquared::new(dof).map_err(|e| CalibrationError::IllConditioned {
                action: "confidence scaling",
                details: e.to_string(),
            })?;
            Ok(dist.inverse_cdf(1.0 - alpha))
        }
    }
}

/// Confidence ellipse of two jointly estimated parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConfidenceEllipse {
    pub center: Vector2<f64>,
    /// Semi-axes of the ellipse, as columns
    pub semi_axes: Matrix2<f64>,
}

impl ConfidenceEllipse {
    /// Builds the ellipse from the 2x2 covariance of the parameters, scaled by `scale` (cf. [chi2_scale]).
    pub fn new(
        center: Vector2<f64>,
        covariance: Matrix2<f64>,
        scale: f64,
    ) -> Result<Self, CalibrationError> {
        let eigen = covariance.symmetric_eigen();
        let largest = eigen.eigenvalues.amax();
        let mut semi_axes = eigen.eigenvectors;
        for (i, mut axis) in semi_axes.column_iter_mut().enumerate() {
            let eigenval = eigen.eigenvalues[i];
            ensure!(
                eigenval.is_finite() && eigenval >= -PSD_TOLERANCE * largest.max(f64::MIN_POSITIVE),
                CovarianceNotPsdSnafu {
                    action: "confidence ellipse"
                }
            );
            axis *= (scale * eigenval.max(0.0)).sqrt();
        }
        Ok(Self { center, semi_axes })
    }

    /// Returns the four extremes of the ellipse along its principal axes: +a, +b, -a, -b.
    pub fn vertices(&self) -> [Vector2<f64>; 4] {
        let a = self.semi_axes.column(0).into_owned();
        let b = self.semi_axes.column(1).into_owned();
        [
            self.center + a,
            self.center + b,
            self.center - a,
            self.center - b,
        ]
    }
}

/// Confidence half-widths of a calibration point.
#[derive(Clone, Debug, PartialEq)]
pub struct Inferences {
    /// Half-width of the static position error ratio interval, per sample
    pub spe_ratio: Vec<f64>,
    /// One sigma half-width of the static position error ratio, per sample
    pub spe_ratio_sigma: Vec<f64>,
    /// Half-width of the outside air temperature interval, per sample (K)
    pub oat: Vec<f64>,
    /// Half-width of the north, east, and down wind intervals (kts)
    pub wind: Vector3<f64>,
    /// Half-width of the temperature recovery correction interval
    pub eta: f64,
}

/// Propagates the parameter covariance into confidence intervals on the SPE ratio and the OAT.
///
/// The SPE ratio and the OAT both depend on the pressure altitude bias and the temperature recovery correction,
/// whose joint confidence ellipse is computed with two degrees of freedom. The ambient solution is evaluated at each
/// of the four vertices of that ellipse, and the extreme mean ambient pressures and mean OATs bound the intervals.
/// The wind and recovery correction intervals are marginal, with a single degree of freedom.
pub fn generate_inferences(
    point: &CalibrationPoint,
    solver: &AmbientSolver,
    parameters: &CalibrationParameters,
    covariance: &Matrix5<f64>,
    alpha: Option<f64>,
) -> Result<Inferences, CalibrationError> {
    let (ib, ie) = (CalibrationParameters::PA_BIAS, CalibrationParameters::ETA);
    let center = Vector2::new(parameters.pa_bias_ft, parameters.eta);
    let sub_cov = Matrix2::new(
        covariance[(ib, ib)],
        covariance[(ib, ie)],
        covariance[(ie, ib)],
        covariance[(ie, ie)],
    );

    let ellipse = ConfidenceEllipse::new(center, sub_cov, chi2_scale(alpha, 2.0)?)?;
    let (spe_ratio, oat) = vertex_half_widths(point, solver, &ellipse)?;

    // The SPE model weights each sample by its one sigma variance, whatever the significance level
    let spe_ratio_sigma = match alpha {
        None => spe_ratio.clone(),
        Some(_) => {
            let one_sigma = ConfidenceEllipse::new(center, sub_cov, 1.0)?;
            vertex_half_widths(point, solver, &one_sigma)?.0
        }
    };

    let marginal = chi2_scale(alpha, 1.0)?;
    let half_width = |idx: usize| -> Result<f64, CalibrationError> {
        let var = covariance[(idx, idx)];
        ensure!(
            var.is_finite() && var >= 0.0,
            CovarianceNotPsdSnafu {
                action: "marginal confidence interval"
            }
        );
        Ok((marginal * var).sqrt())
    };

    Ok(Inferences {
        spe_ratio,
        spe_ratio_sigma,
        oat,
        wind: Vector3::new(half_width(1)?, half_width(2)?, half_width(3)?),
        eta: half_width(ie)?,
    })
}

/// SPE ratio and OAT half-widths, per sample, between the ambient solutions at the vertices of the ellipse
/// with the extreme mean ambient pressures and mean OATs.
fn vertex_half_widths(
    point: &CalibrationPoint,
    solver: &AmbientSolver,
    ellipse: &ConfidenceEllipse,
) -> Result<(Vec<f64>, Vec<f64>), CalibrationError> {
    let solutions = ellipse
        .vertices()
        .par_iter()
        .map(|vertex| {
            solver.solve(
                &point.geometric_height,
                &point.total_pressure,
                &point.temperature,
                point.temperature_source,
                vertex[0],
                vertex[1],
            )
        })
        .collect::<Result<Vec<AmbientSolution>, CalibrationError>>()?;

    let pres_means = solutions
        .iter()
        .map(|sol| sol.mean_ambient_pressure())
        .collect::<Vec<f64>>();
    let oat_means = solutions
        .iter()
        .map(|sol| sol.mean_oat())
        .collect::<Vec<f64>>();

    let (low_pres, high_pres) = extremes(&pres_means)?;
    let (low_oat, high_oat) = extremes(&oat_means)?;

    let spe_ratio = point
        .static_pressure
        .iter()
        .zip(&solutions[low_pres].ambient_pressure)
        .zip(&solutions[high_pres].ambient_pressure)
        .map(|((ps, pa_low), pa_high)| {
            let spe_high = (ps - pa_low) / ps;
            let spe_low = (ps - pa_high) / ps;
            (spe_high - spe_low).abs() / 2.0
        })
        .collect::<Vec<f64>>();

    let oat = solutions[high_oat]
        .oat
        .iter()
        .zip(&solutions[low_oat].oat)
        .map(|(hi, lo)| (hi - lo).abs() / 2.0)
        .collect::<Vec<f64>>();

    Ok((spe_ratio, oat))
}

/// Indexes of the smallest and largest values
fn extremes(values: &[f64]) -> Result<(usize, usize), CalibrationError> {
    let indexed = || values.iter().enumerate().filter(|(_, v)| v.is_finite());
    match (
        indexed().min_by(|a, b| a.1.total_cmp(b.1)),
        indexed().max_by(|a, b| a.1.total_cmp(b.1)),
    ) {
        (Some((low, _)), Some((high, _))) => Ok((low, high)),
        _ => IllConditionedSnafu {
            action: "confidence interval",
            details: "no finite ambient solution at the ellipse vertices".to_string(),
        }
        .fail(),
    }
}

#[cfg(test)]
mod ut_inference {
    use super::*;

    #[test]
    fn chi2_quantiles() {
        assert_eq!(chi2_scale(None, 2.0).unwrap(), 1.0);
        assert!((chi2_scale(Some(0.05), 2.0).unwrap() - 5.991_464_547).abs() < 1e-4);
        assert!((chi2_scale(Some(0.05), 1.0).unwrap() - 3.841_458_821).abs() < 1e-4);
        assert!(chi2_scale(Some(0.0), 2.0).is_err());
        assert!(chi2_scale(Some(1.5), 2.0).is_err());
    }

    #[test]
    fn ellipse_of_diagonal_covariance() {
        let ellipse = ConfidenceEllipse::new(
            Vector2::new(10.0, 0.1),
            Matrix2::new(4.0, 0.0, 0.0, 1e-4),
            1.0,
        )
        .unwrap();
        let mut first = ellipse.vertices().iter().map(|v| v[0]).collect::<Vec<f64>>();
        let mut second = ellipse.vertices().iter().map(|v| v[1]).collect::<Vec<f64>>();
        first.sort_by(|a, b| a.total_cmp(b));
        second.sort_by(|a, b| a.total_cmp(b));
        assert!((first[0] - 8.0).abs() < 1e-9);
        assert!((first[3] - 12.0).abs() < 1e-9);
        assert!((second[0] - 0.09).abs() < 1e-9);
        assert!((second[3] - 0.11).abs() < 1e-9);
    }

    #[test]
    fn indefinite_covariance() {
        assert!(matches!(
            ConfidenceEllipse::new(Vector2::zeros(), Matrix2::new(1.0, 2.0, 2.0, 1.0), 1.0),
            Err(CalibrationError::CovarianceNotPsd { .. })
        ));
    }

    #[test]
    fn extremes_skip_nan() {
        assert_eq!(extremes(&[2.0, f64::NAN, -1.0, 5.0]).unwrap(), (2, 3));
        assert!(extremes(&[f64::NAN]).is_err());
    }
}
