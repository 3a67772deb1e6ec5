//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! A run is described by one [`Config`]; the TOML file (if any) is loaded
//! first and command-line flags override it.

pub mod cli;
pub mod toml;
pub mod validator;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Job description listing the plates to simulate
    pub job_file: Option<PathBuf>,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// How plates are divided among processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistributionStrategy {
    /// Contiguous block of plates per process, fixed up front
    #[default]
    Static,
    /// Rank 0 hands out one plate at a time to whichever worker is free
    Dynamic,
}

/// What to do with a plate whose file cannot be read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlateErrorPolicy {
    /// Stop the whole job
    #[default]
    Abort,
    /// Report the plate as skipped and continue
    Skip,
}

/// Thread and process layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker threads per plate (clamped to the plate's interior rows)
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// In-process ranks for standalone mode
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Plate distribution strategy when more than one process is used
    #[serde(default)]
    pub strategy: DistributionStrategy,
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_processes() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            processes: default_processes(),
            strategy: DistributionStrategy::default(),
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where equilibrated plate files go (default: the job file's directory)
    pub output_dir: Option<PathBuf>,
    /// Where the TSV report goes
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Optional JSON summary file
    pub json_output: Option<PathBuf>,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            report_dir: default_report_dir(),
            json_output: None,
        }
    }
}

/// Runtime behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub on_plate_error: PlateErrorPolicy,
    /// Print DEBUG lines to stderr
    #[serde(default)]
    pub debug: bool,
    /// Validate the job and print the plan without simulating
    #[serde(default)]
    pub dry_run: bool,
}

impl Config {
    /// Job file path, which validation guarantees is present
    pub fn job_path(&self) -> &Path {
        self.job_file.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Directory for equilibrated plate files
    pub fn output_dir(&self) -> PathBuf {
        match &self.output.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .job_path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

// Display trait implementations

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Job file: {}", self.job_path().display())?;
        write!(f, "{}", self.workers)?;
        write!(f, "{}", self.output)?;
        write!(f, "{}", self.runtime)
    }
}

impl fmt::Display for DistributionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionStrategy::Static => write!(f, "static"),
            DistributionStrategy::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl fmt::Display for PlateErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlateErrorPolicy::Abort => write!(f, "abort"),
            PlateErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl fmt::Display for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Threads per plate: {}", self.threads)?;
        writeln!(f, "  Processes: {}", self.processes)?;
        writeln!(f, "  Strategy: {}", self.strategy)
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output_dir {
            Some(dir) => writeln!(f, "  Output directory: {}", dir.display())?,
            None => writeln!(f, "  Output directory: (job directory)")?,
        }
        writeln!(f, "  Report directory: {}", self.report_dir.display())?;
        if let Some(json) = &self.json_output {
            writeln!(f, "  JSON summary: {}", json.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  On plate error: {}", self.on_plate_error)?;
        if self.debug {
            writeln!(f, "  Debug: enabled")?;
        }
        if self.dry_run {
            writeln!(f, "  Dry run: enabled")?;
        }
        Ok(())
    }
}
