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

extern crate levenberg_marquardt;

use super::jacobian::finite_difference_jacobian;
use crate::errors::{CalibrationError, IllConditionedSnafu, MaxIterationsSnafu, NonFiniteSnafu};
use crate::linalg::{storage::Owned, DMatrix, DVector, Dyn};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt as MinpackLM, TerminationReason};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::cell::{Cell, RefCell};
use std::fmt;
use typed_builder::TypedBuilder;

/// Configuration of the Levenberg-Marquardt nonlinear least squares solver (MINPACK `lmder`).
#[derive(Copy, Clone, Debug, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
#[serde(default)]
pub struct LevenbergMarquardt {
    /// Patience of the solver: residual evaluations are capped at `max_iterations · (number of parameters + 1)`
    #[builder(default = 100)]
    pub max_iterations: usize,
    /// Convergence on the relative reduction of the sum of squares
    #[builder(default = 1e-12)]
    pub ftol: f64,
    /// Convergence on the relative change of the parameters
    #[builder(default = 1e-10)]
    pub xtol: f64,
    /// Convergence on the orthogonality between the residuals and the Jacobian columns
    #[builder(default = 1e-10)]
    pub gtol: f64,
    /// Bound of the initial step, relative to the scaled norm of the initial parameters
    #[builder(default = 100.0)]
    pub stepbound: f64,
    /// Scale the parameters by the norms of the Jacobian columns
    #[builder(default = true)]
    pub scale_diag: bool,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Solution of a nonlinear least squares problem.
#[derive(Clone, Debug, PartialEq)]
pub struct LMSolution {
    /// Parameters at convergence
    pub x: DVector<f64>,
    /// Residuals at convergence
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals with respect to the parameters, at convergence
    pub jacobian: DMatrix<f64>,
    /// Sum of the squared residuals
    pub cost: f64,
    /// Number of Jacobian evaluations
    pub iterations: usize,
    /// Number of residual function evaluations, excluding those of the Jacobian
    pub evaluations: usize,
}

impl LMSolution {
    /// Root mean square of the residuals
    pub fn rms(&self) -> f64 {
        (self.cost / self.residuals.len() as f64).sqrt()
    }
}

impl fmt::Display for LMSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(f, "Evaluations: {}", self.evaluations)?;
        writeln!(f, "RMS: {:.6}", self.rms())?;
        write!(f, "Solution: {:.6}", self.x.transpose())
    }
}

/// Least squares problem over a fallible residual function, with a finite difference Jacobian.
///
/// The solver cannot carry errors, so a failed evaluation is stored and reported as missing residuals, which
/// stops the minimization.
struct ResidualProblem<'f, F> {
    func: &'f F,
    x: DVector<f64>,
    residuals: Option<DVector<f64>>,
    /// Lowest sum of squares evaluated, and its parameters
    best: (f64, DVector<f64>),
    error: RefCell<Option<CalibrationError>>,
    jacobians: Cell<usize>,
}

impl<'f, F> ResidualProblem<'f, F>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, CalibrationError> + Sync,
{
    fn store(&self, e: CalibrationError) {
        debug!("LM: evaluation failed ({e})");
        self.error.replace(Some(e));
    }
}

impl<'f, F> LeastSquaresProblem<f64, Dyn, Dyn> for ResidualProblem<'f, F>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, CalibrationError> + Sync,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.x.copy_from(x);
        self.residuals = match (self.func)(x) {
            Ok(resid) => {
                let cost = resid.norm_squared();
                if cost < self.best.0 {
                    self.best = (cost, x.clone());
                }
                Some(resid)
            }
            Err(e) => {
                self.store(e);
                None
            }
        };
    }

    fn params(&self) -> DVector<f64> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals.clone()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let f0 = self.residuals.as_ref()?;
        self.jacobians.set(self.jacobians.get() + 1);
        match finite_difference_jacobian(self.func, &self.x, f0) {
            Ok(jac) => Some(jac),
            Err(e) => {
                self.store(e);
                None
            }
        }
    }
}

impl LevenbergMarquardt {
    /// Minimizes the sum of squared residuals returned by `func`, starting from `x0`.
    ///
    /// Fails with [CalibrationError::MaxIterations] when the solver runs out of patience, with the error of the
    /// residual function if an evaluation fails, and with [CalibrationError::IllConditioned] on numerical failures.
    pub fn minimize<F>(&self, x0: DVector<f64>, func: F) -> Result<LMSolution, CalibrationError>
    where
        F: Fn(&DVector<f64>) -> Result<DVector<f64>, CalibrationError> + Sync,
    {
        let initial = func(&x0)?;
        ensure!(
            initial.iter().all(|r| r.is_finite()),
            NonFiniteSnafu {
                action: "initial residuals"
            }
        );

        let problem = ResidualProblem {
            func: &func,
            best: (initial.norm_squared(), x0.clone()),
            x: x0,
            residuals: Some(initial),
            error: RefCell::new(None),
            jacobians: Cell::new(0),
        };

        let (problem, report) = MinpackLM::new()
            .with_patience(self.max_iterations)
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_stepbound(self.stepbound)
            .with_scale_diag(self.scale_diag)
            .minimize(problem);

        debug!(
            "LM terminated after {} evaluations: {:?} (cost = {:.6e})",
            report.number_of_evaluations, report.termination, report.objective_function
        );

        match report.termination {
            ref reason if reason.was_successful() => {}
            TerminationReason::NoImprovementPossible(criterion) => {
                debug!("LM: tolerance on {criterion} reached machine precision, accepting current estimate");
            }
            TerminationReason::LostPatience => {
                return MaxIterationsSnafu {
                    action: "Levenberg-Marquardt",
                    iterations: self.max_iterations,
                }
                .fail()
            }
            TerminationReason::User(what) => {
                return match problem.error.into_inner() {
                    Some(e) => Err(e),
                    None => IllConditionedSnafu {
                        action: "Levenberg-Marquardt",
                        details: format!("no {what} could be computed"),
                    }
                    .fail(),
                };
            }
            reason => {
                return IllConditionedSnafu {
                    action: "Levenberg-Marquardt",
                    details: format!("{reason:?}"),
                }
                .fail()
            }
        }

        // The last trial may have been rejected
        let x = problem.best.1;
        let residuals = func(&x)?;
        let jacobian = finite_difference_jacobian(&func, &x, &residuals)?;

        Ok(LMSolution {
            cost: residuals.norm_squared(),
            iterations: problem.jacobians.get() + 1,
            evaluations: report.number_of_evaluations + 1,
            x,
            residuals,
            jacobian,
        })
    }
}
