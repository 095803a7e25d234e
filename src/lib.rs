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

/*! # jmoss

Air data system calibration from flight test data, using the Joint Modified Output Static Source (JMOSS) method.

For each calibration point (a maneuver flown at roughly constant altitude through a range of speeds and headings),
the pressure altitude bias, the wind, and the temperature sensor recovery correction are estimated by nonlinear least
squares, by matching the air relative velocity plus the wind to the inertial velocity. The static position error
ratio follows, with confidence intervals propagated from the parameter covariance. Finally, a weighted regression
across points models the static position error as a function of Mach number.
*/

/// Standard atmosphere and Mach number relations, and the translation of static position errors into air data errors.
pub mod atmosphere;

/// Fixed-point solver of the ambient pressure, outside air temperature and Mach number.
pub mod solver;

/// Wind to navigation frame rotations.
pub mod geometry;

/// Nonlinear least squares estimation of the calibration parameters.
pub mod od;

/// Propagation of the parameter covariance into confidence intervals.
pub mod inference;

/// Static position error model across calibration points.
pub mod polyfit;

/// Registry of calibration points and results.
pub mod estimator;

/// Configuration files.
pub mod io;

mod errors;
/// JMOSS will (almost) never panic and functions which may fail will return an error.
pub use self::errors::CalibrationError;

#[macro_use]
extern crate log;
extern crate nalgebra as na;

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
    pub use na::Rotation3;
}

pub mod prelude {
    pub use crate::atmosphere::*;
    pub use crate::errors::CalibrationError;
    pub use crate::estimator::{
        CalibrationPoint, CalibrationResult, Calibrator, CalibratorConfig, Channel, ChannelNames,
        PointSummary, ProcessingReport,
    };
    pub use crate::io::{ConfigError, ConfigRepr};
    pub use crate::od::{CalibrationParameters, LevenbergMarquardt};
    pub use crate::polyfit::{SpeModel, SpePrediction};
    pub use crate::solver::{AmbientSolver, TemperatureSource};
}
