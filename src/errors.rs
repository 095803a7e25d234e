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

use crate::estimator::Channel;
use crate::io::ConfigError;
use snafu::prelude::*;

/// Every fallible operation of the calibration engine returns this error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CalibrationError {
    #[snafu(display("neither ambient temperature nor total temperature channels were provided"))]
    MissingTemperatureSource,

    #[snafu(display(
        "both ambient temperature and total temperature channels were provided, only one may be used"
    ))]
    AmbiguousTemperatureSource,

    #[snafu(display("calibration point `{label}` has already been added"))]
    DuplicatePoint { label: String },

    #[snafu(display("calibration point `{label}` is not in the calibrator"))]
    PointNotFound { label: String },

    #[snafu(display("calibration point `{label}` has not been processed"))]
    ResultNotFound { label: String },

    #[snafu(display("column `{column}` ({channel}) is missing from the records of `{label}`"))]
    MissingColumn {
        label: String,
        channel: Channel,
        column: String,
    },

    #[snafu(display("{channel} of `{label}` has {got} samples but {expected} were expected"))]
    MismatchedLength {
        label: String,
        channel: Channel,
        expected: usize,
        got: usize,
    },

    #[snafu(display("{action} requires inputs of equal length, got {expected} and {got} samples"))]
    LengthMismatch {
        action: &'static str,
        expected: usize,
        got: usize,
    },

    #[snafu(display("{action} requires more than {need} samples, got {got}"))]
    TooFewSamples {
        action: &'static str,
        need: usize,
        got: usize,
    },

    #[snafu(display("no supersonic Mach number root for qc/Pa = {qc_over_pa}"))]
    NoMachRoot { qc_over_pa: f64 },

    #[snafu(display("{action} did not converge after {iterations} iterations"))]
    MaxIterations {
        action: &'static str,
        iterations: usize,
    },

    #[snafu(display("{action} is ill-conditioned: {details}"))]
    IllConditioned {
        action: &'static str,
        details: String,
    },

    #[snafu(display("flight path angle is undefined at sample {index} (no horizontal ground speed)"))]
    DegenerateFlightPath { index: usize },

    #[snafu(display("covariance used for {action} is not positive semi-definite"))]
    CovarianceNotPsd { action: &'static str },

    #[snafu(display("significance level {alpha} is not within (0, 1)"))]
    InvalidSignificance { alpha: f64 },

    #[snafu(display("SPE ratio variance {variance} at sample {index} cannot be used as a weight"))]
    InvalidVariance { index: usize, variance: f64 },

    #[snafu(display("non-finite value encountered in {action}"))]
    NonFinite { action: &'static str },

    #[snafu(display("configuration error: {source}"))]
    Config { source: ConfigError },
}
