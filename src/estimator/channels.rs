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

use crate::errors::{AmbiguousTemperatureSourceSnafu, CalibrationError, MissingTemperatureSourceSnafu};
use crate::solver::TemperatureSource;
use core::fmt;
use enum_iterator::Sequence;
use serde_derive::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Semantic channels of a calibration point
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize)]
pub enum Channel {
    /// Time tag of each sample, optional
    Time,
    /// Inertial north velocity (ft/s)
    NorthVelocity,
    /// Inertial east velocity (ft/s)
    EastVelocity,
    /// Inertial down velocity (ft/s)
    DownVelocity,
    /// Geometric height (ft)
    GeometricHeight,
    /// Total pressure (psi)
    TotalPressure,
    /// Static pressure, as measured by the static source under calibration (psi)
    StaticPressure,
    /// Total or ambient temperature (K)
    Temperature,
    /// Angle of attack vane (rad)
    AngleOfAttack,
    /// Angle of sideslip vane (rad)
    AngleOfSideslip,
    /// Roll angle (rad)
    RollAngle,
    /// Pitch angle (rad)
    PitchAngle,
    /// True heading (rad)
    TrueHeading,
}

impl Channel {
    /// Whether the channel may be omitted from the source data
    pub const fn is_optional(&self) -> bool {
        matches!(self, Self::Time)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Time => "time",
            Self::NorthVelocity => "north velocity",
            Self::EastVelocity => "east velocity",
            Self::DownVelocity => "down velocity",
            Self::GeometricHeight => "geometric height",
            Self::TotalPressure => "total pressure",
            Self::StaticPressure => "static pressure",
            Self::Temperature => "temperature",
            Self::AngleOfAttack => "angle of attack",
            Self::AngleOfSideslip => "angle of sideslip",
            Self::RollAngle => "roll angle",
            Self::PitchAngle => "pitch angle",
            Self::TrueHeading => "true heading",
        };
        write!(f, "{repr}")
    }
}

/// Names of the source columns of each channel.
///
/// Exactly one of `total_temperature` and `ambient_temperature` must be set, it also selects the
/// [TemperatureSource] of every calibration point.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct ChannelNames {
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub time: Option<String>,
    #[builder(setter(into))]
    pub north_velocity: String,
    #[builder(setter(into))]
    pub east_velocity: String,
    #[builder(setter(into))]
    pub down_velocity: String,
    #[builder(setter(into))]
    pub geometric_height: String,
    #[builder(setter(into))]
    pub total_pressure: String,
    #[builder(setter(into))]
    pub static_pressure: String,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub total_temperature: Option<String>,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub ambient_temperature: Option<String>,
    #[builder(setter(into))]
    pub angle_of_attack: String,
    #[builder(setter(into))]
    pub angle_of_sideslip: String,
    #[builder(setter(into))]
    pub roll_angle: String,
    #[builder(setter(into))]
    pub pitch_angle: String,
    #[builder(setter(into))]
    pub true_heading: String,
}

impl ChannelNames {
    /// Returns the temperature source selected by these names
    pub fn temperature_source(&self) -> Result<TemperatureSource, CalibrationError> {
        match (&self.total_temperature, &self.ambient_temperature) {
            (Some(_), None) => Ok(TemperatureSource::Total),
            (None, Some(_)) => Ok(TemperatureSource::Ambient),
            (Some(_), Some(_)) => AmbiguousTemperatureSourceSnafu.fail(),
            (None, None) => MissingTemperatureSourceSnafu.fail(),
        }
    }

    /// Returns the source column name of the provided channel, if configured
    pub fn column(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Time => self.time.as_deref(),
            Channel::NorthVelocity => Some(&self.north_velocity),
            Channel::EastVelocity => Some(&self.east_velocity),
            Channel::DownVelocity => Some(&self.down_velocity),
            Channel::GeometricHeight => Some(&self.geometric_height),
            Channel::TotalPressure => Some(&self.total_pressure),
            Channel::StaticPressure => Some(&self.static_pressure),
            Channel::Temperature => self
                .total_temperature
                .as_deref()
                .or(self.ambient_temperature.as_deref()),
            Channel::AngleOfAttack => Some(&self.angle_of_attack),
            Channel::AngleOfSideslip => Some(&self.angle_of_sideslip),
            Channel::RollAngle => Some(&self.roll_angle),
            Channel::PitchAngle => Some(&self.pitch_angle),
            Channel::TrueHeading => Some(&self.true_heading),
        }
    }
}
