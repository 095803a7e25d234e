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

use super::ChannelNames;
use crate::io::{ConfigError, ConfigRepr, InvalidConfigSnafu};
use crate::od::LevenbergMarquardt;
use crate::solver::AmbientSolver;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use typed_builder::TypedBuilder;

/// Bank angle beyond which samples are excluded from the SPE model (deg)
pub const TURN_MASK_DEG: f64 = 10.0;
/// Bank angle beyond which samples count as a level turn in point summaries (deg)
pub const TURN_SUMMARY_DEG: f64 = 15.0;

fn default_alpha() -> Option<f64> {
    Some(0.05)
}

fn default_turn_mask() -> f64 {
    TURN_MASK_DEG
}

fn default_turn_summary() -> f64 {
    TURN_SUMMARY_DEG
}

/// Configuration of a [super::Calibrator].
///
/// ```yaml
/// channels:
///   north_velocity: VN
///   east_velocity: VE
///   down_velocity: VD
///   geometric_height: HGT
///   total_pressure: PT
///   static_pressure: PS
///   total_temperature: TAT
///   angle_of_attack: AOA
///   angle_of_sideslip: AOS
///   roll_angle: ROLL
///   pitch_angle: PITCH
///   true_heading: HDG
/// alpha: 0.01
/// solver:
///   max_iterations: 50
/// ```
#[derive(Clone, Debug, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct CalibratorConfig {
    /// Source column name of each channel
    pub channels: ChannelNames,
    /// Significance level of the confidence intervals, or one sigma intervals if null
    #[builder(default = default_alpha())]
    #[serde(default = "default_alpha")]
    pub alpha: Option<f64>,
    #[builder(default)]
    #[serde(default)]
    pub solver: AmbientSolver,
    #[builder(default)]
    #[serde(default)]
    pub lm: LevenbergMarquardt,
    /// Bank angle beyond which samples are flagged as turning and excluded from the SPE model (deg)
    #[builder(default = TURN_MASK_DEG)]
    #[serde(default = "default_turn_mask")]
    pub turn_mask_deg: f64,
    /// Bank angle beyond which samples count as a level turn in point summaries (deg)
    #[builder(default = TURN_SUMMARY_DEG)]
    #[serde(default = "default_turn_summary")]
    pub turn_summary_deg: f64,
}

impl CalibratorConfig {
    /// Checks the numerical settings, the channel names are checked by the calibrator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(alpha) = self.alpha {
            ensure!(
                alpha > 0.0 && alpha < 1.0,
                InvalidConfigSnafu {
                    msg: format!("significance level must be within (0, 1), got {alpha}")
                }
            );
        }
        ensure!(
            self.solver.max_iterations > 0 && self.solver.tolerance > 0.0,
            InvalidConfigSnafu {
                msg: "ambient solver needs a positive tolerance and iteration count".to_string()
            }
        );
        ensure!(
            self.lm.max_iterations > 0
                && self.lm.stepbound > 0.0
                && [self.lm.ftol, self.lm.xtol, self.lm.gtol]
                    .iter()
                    .all(|tol| tol.is_finite() && *tol >= 0.0),
            InvalidConfigSnafu {
                msg: "Levenberg-Marquardt needs iterations, a positive step bound and non-negative tolerances"
                    .to_string()
            }
        );
        ensure!(
            self.turn_mask_deg >= 0.0 && self.turn_summary_deg >= 0.0,
            InvalidConfigSnafu {
                msg: "turn thresholds must be non-negative".to_string()
            }
        );
        Ok(())
    }
}

impl ConfigRepr for CalibratorConfig {}
