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
    CalibrationError, ConfigSnafu, DuplicatePointSnafu, PointNotFoundSnafu, ResultNotFoundSnafu,
};
use crate::io::ConfigRepr;
use crate::polyfit::SpeModel;
use crate::solver::TemperatureSource;
use rayon::prelude::*;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

mod channels;
mod config;
mod point;
mod result;

pub use channels::{Channel, ChannelNames};
pub use config::{CalibratorConfig, TURN_MASK_DEG, TURN_SUMMARY_DEG};
pub use point::{CalibrationPoint, PointSummary};
pub use result::CalibrationResult;

/// Registry of calibration points, their results, and the SPE model fitted across them.
///
/// Points are keyed by their unique label. Processing a point (again) replaces its result.
#[derive(Clone, Debug)]
pub struct Calibrator {
    config: CalibratorConfig,
    temperature_source: TemperatureSource,
    points: BTreeMap<String, CalibrationPoint>,
    results: BTreeMap<String, CalibrationResult>,
    model: Option<SpeModel>,
}

/// Outcome of processing several calibration points: the successful labels, and the error of each failed label.
#[derive(Debug, Default)]
pub struct ProcessingReport {
    pub processed: Vec<String>,
    pub failed: BTreeMap<String, CalibrationError>,
}

impl ProcessingReport {
    /// Whether every requested point was processed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for ProcessingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} point(s) processed, {} failed",
            self.processed.len(),
            self.failed.len()
        )?;
        for (label, err) in &self.failed {
            write!(f, "\n\t{label}: {err}")?;
        }
        Ok(())
    }
}

impl Calibrator {
    /// Initializes an empty calibrator, ensuring that exactly one temperature channel is configured.
    pub fn new(config: CalibratorConfig) -> Result<Self, CalibrationError> {
        config.validate().context(ConfigSnafu)?;
        let temperature_source = config.channels.temperature_source()?;
        info!("calibrator initialized using the {temperature_source}");
        Ok(Self {
            config,
            temperature_source,
            points: BTreeMap::new(),
            results: BTreeMap::new(),
            model: None,
        })
    }

    /// Initializes an empty calibrator from the YAML configuration file at the provided path.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        Self::new(CalibratorConfig::load(path).context(ConfigSnafu)?)
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    pub fn temperature_source(&self) -> TemperatureSource {
        self.temperature_source
    }

    /// Adds a calibration point from its source columns, keyed by the column names of the configuration.
    pub fn add_point(
        &mut self,
        label: &str,
        columns: &HashMap<String, Vec<f64>>,
    ) -> Result<(), CalibrationError> {
        ensure!(
            !self.points.contains_key(label),
            DuplicatePointSnafu { label }
        );
        let point = CalibrationPoint::from_columns(label, &self.config.channels, columns)?;
        self.insert_point(point)
    }

    /// Adds an already built calibration point.
    pub fn insert_point(&mut self, point: CalibrationPoint) -> Result<(), CalibrationError> {
        ensure!(
            !self.points.contains_key(&point.label),
            DuplicatePointSnafu {
                label: &point.label
            }
        );
        point.validate()?;
        match point.summary(self.config.turn_summary_deg) {
            Ok(summary) => info!("new calibration point {summary}"),
            Err(e) => warn!("new calibration point `{}` cannot be summarized: {e}", point.label),
        }
        self.points.insert(point.label.clone(), point);
        Ok(())
    }

    pub fn point(&self, label: &str) -> Result<&CalibrationPoint, CalibrationError> {
        self.points.get(label).context(PointNotFoundSnafu { label })
    }

    /// Speed and altitude envelope of a calibration point
    pub fn point_summary(&self, label: &str) -> Result<PointSummary, CalibrationError> {
        self.point(label)?.summary(self.config.turn_summary_deg)
    }

    /// Labels of all calibration points, sorted
    pub fn point_labels(&self) -> Vec<&str> {
        self.points.keys().map(String::as_str).collect()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Processes a single calibration point, replacing any previous result.
    pub fn process_point(&mut self, label: &str) -> Result<&CalibrationResult, CalibrationError> {
        let point = self.point(label)?;
        info!("processing `{label}`");
        let result = CalibrationResult::new(point, &self.config)?;
        self.results.insert(label.to_string(), result);
        self.result(label)
    }

    /// Processes the provided calibration points, or all of them, in parallel.
    ///
    /// A failing point does not stop the others: its error is reported, and the results of the successful points
    /// are stored.
    pub fn process_points(&mut self, labels: Option<&[&str]>) -> ProcessingReport {
        let labels = match labels {
            Some(labels) => labels.iter().map(|l| l.to_string()).collect::<Vec<String>>(),
            None => self.points.keys().cloned().collect(),
        };
        info!("processing {} calibration point(s)", labels.len());

        let outcomes = labels
            .par_iter()
            .map(|label| {
                let outcome = self
                    .point(label)
                    .and_then(|point| CalibrationResult::new(point, &self.config));
                (label.clone(), outcome)
            })
            .collect::<Vec<(String, Result<CalibrationResult, CalibrationError>)>>();

        let mut report = ProcessingReport::default();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    self.results.insert(label.clone(), result);
                    report.processed.push(label);
                }
                Err(e) => {
                    warn!("processing `{label}` failed: {e}");
                    report.failed.insert(label, e);
                }
            }
        }
        info!("{report}");
        report
    }

    pub fn result(&self, label: &str) -> Result<&CalibrationResult, CalibrationError> {
        ensure!(self.points.contains_key(label), PointNotFoundSnafu { label });
        self.results.get(label).context(ResultNotFoundSnafu { label })
    }

    /// Results of the provided labels, or of all the calibration points. Fails if any of them is not processed.
    pub fn results(&self, labels: Option<&[&str]>) -> Result<Vec<&CalibrationResult>, CalibrationError> {
        match labels {
            Some(labels) => labels.iter().map(|label| self.result(label)).collect(),
            None => self.points.keys().map(|label| self.result(label)).collect(),
        }
    }

    /// Labels of all processed calibration points, sorted
    pub fn result_labels(&self) -> Vec<&str> {
        self.results.keys().map(String::as_str).collect()
    }

    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// Fits the SPE model across the results of the provided labels, or of all the calibration points.
    pub fn fit_model(
        &mut self,
        labels: Option<&[&str]>,
        knots: Option<Vec<f64>>,
        num_knots: Option<usize>,
    ) -> Result<&SpeModel, CalibrationError> {
        let model = SpeModel::fit(&self.results(labels)?, knots, num_knots)?;
        info!("{model}");
        Ok(&*self.model.insert(model))
    }

    /// SPE model of the last successful fit
    pub fn model(&self) -> Option<&SpeModel> {
        self.model.as_ref()
    }
}
