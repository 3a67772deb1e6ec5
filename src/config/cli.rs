//! CLI argument parsing using clap

use super::{DistributionStrategy, PlateErrorPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - threads and in-process ranks on one machine
    Standalone,
    /// Coordinator mode - rank 0 of a run spread over service nodes
    Coordinator,
    /// Service mode - wait for a coordinator and serve as a worker rank
    Service,
}

/// heatplate - simulate heat diffusion on plates until equilibrium
#[derive(Parser, Debug)]
#[command(name = "heatplate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, coordinator, or service
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Port for the service to listen on (service mode only)
    #[arg(long, default_value = "9999")]
    pub listen_port: u16,

    /// Comma-separated list of service addresses for coordinator mode (e.g., "10.0.1.10:9999,10.0.1.11:9999")
    #[arg(long)]
    pub host_list: Option<String>,

    /// Job description file
    ///
    /// Not required in service mode (the coordinator sends the job)
    #[arg(value_name = "JOB_FILE")]
    pub job_file: Option<PathBuf>,

    /// Worker threads per plate (default: number of CPUs)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// In-process ranks to divide plates among (standalone mode)
    #[arg(short = 'p', long)]
    pub processes: Option<usize>,

    /// Plate distribution strategy across processes
    #[arg(long, value_enum)]
    pub strategy: Option<DistributionStrategy>,

    /// Directory for equilibrated plate files (default: the job file's directory)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for the TSV report
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// What to do when a plate file cannot be read or written
    #[arg(long, value_enum)]
    pub on_plate_error: Option<PlateErrorPolicy>,

    /// Write a JSON summary to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// TOML configuration file (command-line flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print debug output
    #[arg(long)]
    pub debug: bool,

    /// Validate the job and show the plan without simulating
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Service addresses from `--host-list`, in rank order
    pub fn hosts(&self) -> Vec<String> {
        self.host_list
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|host| !host.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
