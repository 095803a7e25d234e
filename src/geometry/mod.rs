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
    CalibrationError, DegenerateFlightPathSnafu, LengthMismatchSnafu, TooFewSamplesSnafu,
};
use crate::estimator::CalibrationPoint;
use crate::linalg::{Rotation3, Vector3};
use snafu::ensure;

/// Per sample rotations from the wind axes to the navigation (north, east, down) axes.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTransform {
    pub wind_to_nav: Vec<Rotation3<f64>>,
}

impl FrameTransform {
    /// Builds the wind to navigation rotations of a calibration point.
    ///
    /// The vanes are not trusted as is: the angle of attack is rebuilt from the pitch angle and the flight path angle
    /// derived from the inertial velocities, and the sideslip vane is corrected for that angle of attack.
    pub fn from_point(point: &CalibrationPoint) -> Result<Self, CalibrationError> {
        Self::new(
            &point.roll_angle,
            &point.pitch_angle,
            &point.true_heading,
            &point.angle_of_sideslip,
            &point.north_velocity,
            &point.east_velocity,
            &point.down_velocity,
        )
    }

    /// Builds the wind to navigation rotations from the attitude (rad), the indicated sideslip (rad), and the
    /// inertial velocities (any consistent unit).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        roll: &[f64],
        pitch: &[f64],
        heading: &[f64],
        aos_ind: &[f64],
        north_vel: &[f64],
        east_vel: &[f64],
        down_vel: &[f64],
    ) -> Result<Self, CalibrationError> {
        ensure!(
            !roll.is_empty(),
            TooFewSamplesSnafu {
                action: "frame transformation",
                need: 0_usize,
                got: 0_usize,
            }
        );
        for channel in [pitch, heading, aos_ind, north_vel, east_vel, down_vel] {
            ensure!(
                channel.len() == roll.len(),
                LengthMismatchSnafu {
                    action: "frame transformation",
                    expected: roll.len(),
                    got: channel.len(),
                }
            );
        }

        let mut wind_to_nav = Vec::with_capacity(roll.len());
        for i in 0..roll.len() {
            let ground_speed = north_vel[i].hypot(east_vel[i]);
            ensure!(ground_speed > 0.0, DegenerateFlightPathSnafu { index: i });
            let gamma = (-down_vel[i] / ground_speed).clamp(-1.0, 1.0).asin();
            let alpha_corr = pitch[i] - gamma;
            let beta_corr = (alpha_corr.cos() * aos_ind[i].tan()).atan();

            // Yaw, pitch, roll sequence
            let body_to_nav = Rotation3::from_euler_angles(roll[i], pitch[i], heading[i]);
            // Body to wind is the yaw (-beta), pitch (alpha) sequence
            let wind_to_body = Rotation3::from_euler_angles(0.0, alpha_corr, -beta_corr).inverse();

            wind_to_nav.push(body_to_nav * wind_to_body);
        }
        Ok(Self { wind_to_nav })
    }

    pub fn len(&self) -> usize {
        self.wind_to_nav.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wind_to_nav.is_empty()
    }

    /// Rotates an airspeed aligned with the wind x axis into the navigation frame, for each sample.
    pub fn airspeed_to_nav(&self, airspeed: &[f64]) -> Vec<Vector3<f64>> {
        self.wind_to_nav
            .iter()
            .zip(airspeed)
            .map(|(dcm, tas)| dcm * Vector3::new(*tas, 0.0, 0.0))
            .collect()
    }
}
