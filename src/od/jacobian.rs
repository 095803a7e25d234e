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

use crate::errors::{CalibrationError, NonFiniteSnafu};
use crate::linalg::{DMatrix, DVector};
use rayon::prelude::*;
use snafu::ensure;

/// Forward finite difference Jacobian of `func` at `x`, where `f0` is `func(x)`.
///
/// Each column perturbs a single parameter by sqrt(ε)·max(|x|, 1), and the columns are computed in parallel.
pub(crate) fn finite_difference_jacobian<F>(
    func: &F,
    x: &DVector<f64>,
    f0: &DVector<f64>,
) -> Result<DMatrix<f64>, CalibrationError>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, CalibrationError> + Sync,
{
    let columns = (0..x.len())
        .into_par_iter()
        .map(|j| {
            let step = f64::EPSILON.sqrt() * x[j].abs().max(1.0);
            let mut perturbed = x.clone();
            perturbed[j] += step;
            // Use the representable step to limit round-off
            let step = perturbed[j] - x[j];
            let fp = func(&perturbed)?;
            Ok((fp - f0) / step)
        })
        .collect::<Result<Vec<DVector<f64>>, CalibrationError>>()?;

    let jac = DMatrix::from_columns(&columns);
    ensure!(
        jac.iter().all(|v| v.is_finite()),
        NonFiniteSnafu {
            action: "finite difference Jacobian"
        }
    );
    Ok(jac)
}

#[test]
fn linear_jacobian() {
    let a = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, -3.0, 0.5, 0.0, 4.0]);
    let func = |x: &DVector<f64>| Ok::<_, CalibrationError>(&a * x);
    let x = DVector::from_vec(vec![0.3, -7.0]);
    let jac = finite_difference_jacobian(&func, &x, &func(&x).unwrap()).unwrap();
    assert!((jac - a).amax() < 1e-6);
}
