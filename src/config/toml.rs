//! TOML configuration file parsing
//!
//! ```toml
//! job_file = "jobs/job001.txt"
//!
//! [workers]
//! threads = 8
//! processes = 4
//! strategy = "dynamic"
//!
//! [output]
//! output_dir = "out"
//! report_dir = "reports"
//!
//! [runtime]
//! on_plate_error = "skip"
//! ```

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the run configuration from the command line, loading `--config` first
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, base)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(job_file) = &cli.job_file {
        config.job_file = Some(job_file.clone());
    }

    // Worker layout
    if let Some(threads) = cli.threads {
        config.workers.threads = threads;
    }
    if let Some(processes) = cli.processes {
        config.workers.processes = processes;
    }
    if let Some(strategy) = cli.strategy {
        config.workers.strategy = strategy;
    }

    // Output locations
    if let Some(dir) = &cli.output_dir {
        config.output.output_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.report_dir {
        config.output.report_dir = dir.clone();
    }
    if let Some(json) = &cli.json {
        config.output.json_output = Some(json.clone());
    }

    // Runtime flags only ever switch behavior on
    if let Some(policy) = cli.on_plate_error {
        config.runtime.on_plate_error = policy;
    }
    config.runtime.debug |= cli.debug;
    config.runtime.dry_run |= cli.dry_run;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
job_file = "jobs/job001.txt"

[workers]
threads = 8
processes = 3
strategy = "dynamic"

[output]
output_dir = "out"
json_output = "summary.json"

[runtime]
on_plate_error = "skip"
debug = true
"#;

    #[test]
    fn test_parse_toml_full() {
        let config = parse_toml_string(FULL).unwrap();
        assert_eq!(config.job_file, Some(PathBuf::from("jobs/job001.txt")));
        assert_eq!(config.workers.threads, 8);
        assert_eq!(config.workers.processes, 3);
        assert_eq!(config.workers.strategy, DistributionStrategy::Dynamic);
        assert_eq!(config.output.output_dir, Some(PathBuf::from("out")));
        assert_eq!(config.output.report_dir, PathBuf::from("reports"));
        assert_eq!(config.runtime.on_plate_error, PlateErrorPolicy::Skip);
        assert!(config.runtime.debug);
    }

    #[test]
    fn test_parse_toml_minimal_uses_defaults() {
        let config = parse_toml_string("job_file = \"job.txt\"\n").unwrap();
        assert_eq!(config.workers.processes, 1);
        assert_eq!(config.workers.strategy, DistributionStrategy::Static);
        assert!(!config.runtime.dry_run);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let text = "[workers]\nstrategy = \"round-robin\"\n";
        assert!(parse_toml_string(text).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "heatplate",
            "--config",
            path.as_str(),
            "--threads",
            "2",
            "--strategy",
            "static",
            "other.txt",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.job_file, Some(PathBuf::from("other.txt")));
        assert_eq!(config.workers.threads, 2);
        assert_eq!(config.workers.strategy, DistributionStrategy::Static);
        // Untouched by the command line
        assert_eq!(config.workers.processes, 3);
        assert_eq!(config.runtime.on_plate_error, PlateErrorPolicy::Skip);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::try_parse_from(["heatplate", "--config", "/nonexistent/heat.toml", "job.txt"]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
