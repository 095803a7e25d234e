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

use super::{Channel, ChannelNames};
use crate::atmosphere::mach_from_qc_over_pa;
use crate::errors::{
    CalibrationError, MismatchedLengthSnafu, MissingColumnSnafu, MissingTemperatureSourceSnafu,
    TooFewSamplesSnafu,
};
use crate::solver::{mean, TemperatureSource};
use enum_iterator::all;
use snafu::{ensure, OptionExt};
use std::collections::HashMap;
use std::fmt;
use typed_builder::TypedBuilder;

/// Flight test data of a single maneuver, one entry per sample in every channel.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(doc)]
pub struct CalibrationPoint {
    #[builder(setter(into))]
    pub label: String,
    #[builder(default, setter(strip_option))]
    pub time: Option<Vec<f64>>,
    /// Inertial north velocity (ft/s)
    pub north_velocity: Vec<f64>,
    /// Inertial east velocity (ft/s)
    pub east_velocity: Vec<f64>,
    /// Inertial down velocity (ft/s)
    pub down_velocity: Vec<f64>,
    /// Geometric height (ft)
    pub geometric_height: Vec<f64>,
    /// Total pressure (psi)
    pub total_pressure: Vec<f64>,
    /// Static pressure of the source under calibration (psi)
    pub static_pressure: Vec<f64>,
    /// Probe temperature (K), see `temperature_source`
    pub temperature: Vec<f64>,
    #[builder(default)]
    pub temperature_source: TemperatureSource,
    /// Angle of attack vane (rad)
    pub angle_of_attack: Vec<f64>,
    /// Angle of sideslip vane (rad)
    pub angle_of_sideslip: Vec<f64>,
    pub roll_angle: Vec<f64>,
    pub pitch_angle: Vec<f64>,
    pub true_heading: Vec<f64>,
}

impl CalibrationPoint {
    /// Builds a calibration point from source columns keyed by name, as mapped by the channel names.
    pub fn from_columns(
        label: &str,
        names: &ChannelNames,
        columns: &HashMap<String, Vec<f64>>,
    ) -> Result<Self, CalibrationError> {
        let temperature_source = names.temperature_source()?;
        let required = |channel: Channel| -> Result<Vec<f64>, CalibrationError> {
            // Only the temperature may be unnamed among the required channels
            let column = names
                .column(channel)
                .context(MissingTemperatureSourceSnafu)?;
            columns.get(column).cloned().context(MissingColumnSnafu {
                label,
                channel,
                column,
            })
        };

        let point = Self {
            label: label.to_string(),
            time: names
                .time
                .is_some()
                .then(|| required(Channel::Time))
                .transpose()?,
            north_velocity: required(Channel::NorthVelocity)?,
            east_velocity: required(Channel::EastVelocity)?,
            down_velocity: required(Channel::DownVelocity)?,
            geometric_height: required(Channel::GeometricHeight)?,
            total_pressure: required(Channel::TotalPressure)?,
            static_pressure: required(Channel::StaticPressure)?,
            temperature: required(Channel::Temperature)?,
            temperature_source,
            angle_of_attack: required(Channel::AngleOfAttack)?,
            angle_of_sideslip: required(Channel::AngleOfSideslip)?,
            roll_angle: required(Channel::RollAngle)?,
            pitch_angle: required(Channel::PitchAngle)?,
            true_heading: required(Channel::TrueHeading)?,
        };
        point.validate()?;
        Ok(point)
    }

    /// Returns the samples of the provided channel
    pub fn channel(&self, channel: Channel) -> Option<&[f64]> {
        match channel {
            Channel::Time => self.time.as_deref(),
            Channel::NorthVelocity => Some(&self.north_velocity),
            Channel::EastVelocity => Some(&self.east_velocity),
            Channel::DownVelocity => Some(&self.down_velocity),
            Channel::GeometricHeight => Some(&self.geometric_height),
            Channel::TotalPressure => Some(&self.total_pressure),
            Channel::StaticPressure => Some(&self.static_pressure),
            Channel::Temperature => Some(&self.temperature),
            Channel::AngleOfAttack => Some(&self.angle_of_attack),
            Channel::AngleOfSideslip => Some(&self.angle_of_sideslip),
            Channel::RollAngle => Some(&self.roll_angle),
            Channel::PitchAngle => Some(&self.pitch_angle),
            Channel::TrueHeading => Some(&self.true_heading),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.north_velocity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.north_velocity.is_empty()
    }

    /// Ensures that the point has samples, and that every channel has the same number of samples.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let expected = self.len();
        ensure!(
            expected > 0,
            TooFewSamplesSnafu {
                action: "calibration point",
                need: 0_usize,
                got: 0_usize,
            }
        );
        for channel in all::<Channel>() {
            if let Some(samples) = self.channel(channel) {
                ensure!(
                    samples.len() == expected,
                    MismatchedLengthSnafu {
                        label: &self.label,
                        channel,
                        expected,
                        got: samples.len(),
                    }
                );
            }
        }
        Ok(())
    }

    /// Instrument corrected Mach number, computed from the measured total and static pressures
    pub fn mach_ic(&self) -> Result<Vec<f64>, CalibrationError> {
        self.total_pressure
            .iter()
            .zip(&self.static_pressure)
            .map(|(pt, ps)| mach_from_qc_over_pa((pt - ps) / ps))
            .collect()
    }

    /// Whether the aircraft is turning at each sample, i.e. banked more than the provided angle
    pub fn turning(&self, threshold_deg: f64) -> Vec<bool> {
        self.roll_angle
            .iter()
            .map(|roll| roll.to_degrees().abs() > threshold_deg)
            .collect()
    }

    /// Summarizes the speed and altitude envelope of this point, where turning is a bank beyond `turn_deg`.
    pub fn summary(&self, turn_deg: f64) -> Result<PointSummary, CalibrationError> {
        let mach = self.mach_ic()?;
        let turn_mach = mach
            .iter()
            .zip(self.turning(turn_deg))
            .filter_map(|(m, turning)| turning.then_some(*m))
            .collect::<Vec<f64>>();

        let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
        let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let min_height_ft = min(self.geometric_height.as_slice());
        let max_height_ft = max(self.geometric_height.as_slice());

        Ok(PointSummary {
            label: self.label.clone(),
            num_samples: self.len(),
            min_mach: min(mach.as_slice()),
            max_mach: max(mach.as_slice()),
            turn_mach: (!turn_mach.is_empty()).then(|| mean(&turn_mach)),
            min_height_ft,
            max_height_ft,
            height_tolerance_ft: (max_height_ft - min_height_ft) / 2.0,
        })
    }
}

/// Speed and altitude envelope of a calibration point
#[derive(Clone, Debug, PartialEq)]
pub struct PointSummary {
    pub label: String,
    pub num_samples: usize,
    /// Minimum instrument corrected Mach number
    pub min_mach: f64,
    /// Maximum instrument corrected Mach number
    pub max_mach: f64,
    /// Mean instrument corrected Mach number during the level turn, if any
    pub turn_mach: Option<f64>,
    pub min_height_ft: f64,
    pub max_height_ft: f64,
    /// Half of the geometric height span (ft)
    pub height_tolerance_ft: f64,
}

impl fmt::Display for PointSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} samples): {:.2} M to {:.2} M",
            self.label, self.num_samples, self.min_mach, self.max_mach
        )?;
        if let Some(turn_mach) = self.turn_mach {
            write!(f, ", level turn at {turn_mach:.2} M")?;
        }
        write!(
            f,
            ", {:.2} Kft to {:.2} Kft (±{:.0} ft)",
            self.min_height_ft / 1000.0,
            self.max_height_ft / 1000.0,
            self.height_tolerance_ft
        )
    }
}
