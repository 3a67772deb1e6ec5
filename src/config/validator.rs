//! Configuration validation
//!
//! Failures are reported as [`HeatError::InvalidArgument`] so the binary
//! exits with the argument-error code.

use super::*;
use crate::error::HeatError;
use anyhow::Result;

fn reject(message: String) -> Result<()> {
    Err(HeatError::InvalidArgument(message).into())
}

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_job_file(config)?;
    validate_workers(&config.workers)?;
    validate_output(&config.output)?;

    Ok(())
}

/// A job file must be given and must exist
pub fn validate_job_file(config: &Config) -> Result<()> {
    match &config.job_file {
        None => reject("a job file is required".to_string()),
        Some(path) if !path.is_file() => reject(format!("job file not found: {}", path.display())),
        Some(_) => Ok(()),
    }
}

/// Validate workers configuration
pub fn validate_workers(workers: &WorkerConfig) -> Result<()> {
    if workers.threads == 0 {
        return reject("workers.threads must be at least 1".to_string());
    }
    if workers.processes == 0 {
        return reject("workers.processes must be at least 1".to_string());
    }

    // Warn if thread count is very high
    if workers.threads > 1024 {
        eprintln!(
            "Warning: Very high thread count ({}), this may cause performance issues",
            workers.threads
        );
    }

    if workers.processes == 2 && workers.strategy == DistributionStrategy::Dynamic {
        eprintln!("Warning: Dynamic distribution with 2 processes leaves a single worker; rank 0 only coordinates");
    }

    Ok(())
}

/// Validate output configuration
pub fn validate_output(output: &OutputConfig) -> Result<()> {
    if output.report_dir.as_os_str().is_empty() {
        return reject("output.report_dir must not be empty".to_string());
    }

    if let Some(json) = &output.json_output {
        if json.is_dir() {
            return reject(format!("JSON output path is a directory: {}", json.display()));
        }
    }

    Ok(())
}

/// Validate the coordinator's service list
pub fn validate_hosts(hosts: &[String]) -> Result<()> {
    if hosts.is_empty() {
        return reject("coordinator mode requires --host-list".to_string());
    }
    for host in hosts {
        if !host.contains(':') {
            return reject(format!("host '{}' is missing a port (expected HOST:PORT)", host));
        }
    }
    Ok(())
}
