//! heatplate CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use heatplate::config::cli::{Cli, ExecutionMode};
use heatplate::config::{toml::load_config, validator, Config};
use heatplate::distributed::{DistributedCoordinator, NodeService};
use heatplate::error::exit_code_for;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.mode {
        ExecutionMode::Standalone => run_standalone(&cli),
        ExecutionMode::Coordinator => run_coordinator(&cli),
        ExecutionMode::Service => run_service(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Build and validate the run configuration
fn build_config(cli: &Cli) -> Result<Config> {
    let config = load_config(cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;

    if config.runtime.debug {
        eprintln!("DEBUG: {:?}", config);
    }
    Ok(config)
}

/// Run in standalone mode (single machine)
fn run_standalone(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;
    print_configuration(&config);

    heatplate::simulation::run_standalone(&config)?;
    Ok(())
}

/// Run in coordinator mode (rank 0 of a distributed run)
fn run_coordinator(cli: &Cli) -> Result<()> {
    let node_addresses = cli.hosts();
    validator::validate_hosts(&node_addresses).context("Configuration validation failed")?;

    let config = build_config(cli)?;
    print_configuration(&config);
    println!("  Nodes: {}", node_addresses.join(", "));
    println!();

    DistributedCoordinator::new(config, node_addresses)?.run()?;
    Ok(())
}

/// Run in service mode (worker rank for remote coordinators)
fn run_service(cli: &Cli) -> Result<()> {
    println!("heatplate v{}", env!("CARGO_PKG_VERSION"));
    NodeService::new(cli.listen_port).run()
}

fn print_configuration(config: &Config) {
    println!("heatplate v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("{}", config);
    println!();
}
