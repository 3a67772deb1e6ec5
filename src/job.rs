//! Job descriptions
//!
//! A job file lists one plate per line:
//!
//! ```text
//! plate001.bin	1200	127	1000	2
//! plate002.bin	60	0.08	450	0.075
//! ```
//!
//! Fields are the plate file, the time step in whole seconds, the thermal
//! diffusivity, the cell spacing and the equilibrium epsilon. Fields may be
//! separated by tabs or spaces. Blank lines and lines starting with `#` are
//! ignored. Plate files are resolved against the job file's directory.

use crate::engine::RelaxationParams;
use crate::error::HeatError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How one plate ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateOutcome {
    /// Reached equilibrium after `states` rounds
    Equilibrated { states: u64 },
    /// Could not be loaded or stored and the run was told to skip it
    Skipped { reason: String },
}

impl PlateOutcome {
    /// State count, if the plate was equilibrated
    pub fn states(&self) -> Option<u64> {
        match self {
            PlateOutcome::Equilibrated { states } => Some(*states),
            PlateOutcome::Skipped { .. } => None,
        }
    }
}

/// One plate of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    /// Plate file as written in the job file
    pub file_name: String,
    /// Seconds simulated per round
    pub time_step: u64,
    pub diffusivity: f64,
    /// Edge length of one cell
    pub spacing: f64,
    pub epsilon: f64,
    /// Filled in once the plate has been processed
    #[serde(default)]
    pub outcome: Option<PlateOutcome>,
}

impl Plate {
    pub fn params(&self) -> RelaxationParams {
        RelaxationParams::new(self.diffusivity, self.time_step, self.spacing, self.epsilon)
    }

    /// File name without directories or extension (`dir/plate001.bin` -> `plate001`)
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }

    /// Simulated seconds covered by `states` rounds
    pub fn simulated_seconds(&self, states: u64) -> u64 {
        states.saturating_mul(self.time_step)
    }

    fn parse(line: &str, line_number: usize, origin: &Path) -> Result<Self, HeatError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(HeatError::malformed(
                origin,
                format!("line {}: expected 5 fields, found {}", line_number, fields.len()),
            ));
        }

        let number = |index: usize, what: &str| -> Result<f64, HeatError> {
            fields[index].parse::<f64>().map_err(|e| {
                HeatError::malformed(
                    origin,
                    format!("line {}: invalid {} '{}': {}", line_number, what, fields[index], e),
                )
            })
        };

        let time_step = fields[1].parse::<u64>().map_err(|e| {
            HeatError::malformed(
                origin,
                format!("line {}: invalid time step '{}': {}", line_number, fields[1], e),
            )
        })?;

        Ok(Self {
            file_name: fields[0].to_string(),
            time_step,
            diffusivity: number(2, "diffusivity")?,
            spacing: number(3, "spacing")?,
            epsilon: number(4, "epsilon")?,
            outcome: None,
        })
    }
}

/// All plates of one job file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// The job file itself
    pub path: PathBuf,
    /// Directory plate files are resolved against
    pub source_dir: PathBuf,
    pub plates: Vec<Plate>,
}

impl Job {
    /// Parse job text read from `path`
    pub fn parse(path: &Path, text: &str) -> Result<Self, HeatError> {
        let mut plates = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            plates.push(Plate::parse(line, index + 1, path)?);
        }

        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            source_dir,
            plates,
        })
    }

    /// Job file name without directories or extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string())
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// Location of plate `index`'s input file
    pub fn plate_path(&self, index: usize) -> PathBuf {
        self.source_dir.join(&self.plates[index].file_name)
    }

    /// Record the outcome of plate `index`
    pub fn record(&mut self, index: usize, outcome: PlateOutcome) {
        self.plates[index].outcome = Some(outcome);
    }

    /// Outcomes in plate order, `None` for plates not processed yet
    pub fn outcomes(&self) -> impl Iterator<Item = Option<&PlateOutcome>> {
        self.plates.iter().map(|plate| plate.outcome.as_ref())
    }
}

/// Read and parse a job file
pub fn read_job_description(path: &Path) -> Result<Job, HeatError> {
    let text = fs::read_to_string(path).map_err(|e| HeatError::io("Failed to read job file", path, e))?;
    Job::parse(path, &text)
}
