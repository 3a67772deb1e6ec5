//! Job orchestration
//!
//! Reads the job, hands its plates to the local loop or a distribution
//! strategy, records every outcome and writes the report. Standalone mode
//! runs all of it in this process; coordinator mode shares the preparation
//! and finishing steps and replaces the middle with TCP ranks.

use crate::config::{Config, DistributionStrategy};
use crate::distributed::{distributor_for, solve_locally, Communicator, LocalCluster};
use crate::engine::Engine;
use crate::error::HeatError;
use crate::job::{read_job_description, Job, PlateOutcome};
use crate::output::{build_job_summary, report_path, write_json_output, write_report};
use crate::partition::partition_all;
use crate::solver::{FileSolver, PlateSolver};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A job that ran to completion
#[derive(Debug)]
pub struct JobRun {
    /// The job with every plate's outcome recorded
    pub job: Job,
    pub report_file: PathBuf,
    /// Time spent solving plates
    pub wall_time: Duration,
}

/// Start-of-run timestamps
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Run a whole job on this machine
///
/// Returns `None` for a dry run.
pub fn run_standalone(config: &Config) -> Result<Option<JobRun>> {
    let job = prepare_job(config)?;
    let processes = config.workers.processes;

    if config.runtime.dry_run {
        print_plan(config, &job, processes);
        return Ok(None);
    }

    let solver = build_solver(config)?;
    let clock = RunClock::start();

    let outcomes = if processes == 1 {
        solve_locally(&job, &solver, 0..job.len())?
    } else {
        if config.runtime.debug {
            eprintln!("DEBUG: Running {} in-process ranks ({} strategy)", processes, config.workers.strategy);
        }
        let strategy = config.workers.strategy;
        let results = LocalCluster::run(processes, |mut comm| run_rank(&mut comm, &job, &solver, strategy))?;
        collect_outcomes(results, config.runtime.debug)?
    };

    finish_job(config, job, outcomes, processes, clock).map(Some)
}

/// Read the job and create the directories its results go to
pub fn prepare_job(config: &Config) -> Result<Job> {
    let job = read_job_description(config.job_path())
        .with_context(|| format!("Failed to read job {}", config.job_path().display()))?;
    if job.is_empty() {
        eprintln!("Warning: Job {} lists no plates", job.path.display());
    }

    let output_dir = config.output_dir();
    for dir in [&output_dir, &config.output.report_dir] {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| HeatError::io("Failed to create directory", dir.as_path(), e))?;
        }
    }

    if config.runtime.debug {
        eprintln!("DEBUG: Loaded {} plates from {}", job.len(), job.path.display());
    }
    Ok(job)
}

/// Plate solver for this configuration
pub fn build_solver(config: &Config) -> Result<FileSolver> {
    let engine = Engine::new(config.workers.threads)?.with_debug(config.runtime.debug);
    Ok(FileSolver::new(engine, config.output_dir(), config.runtime.on_plate_error))
}

/// This rank's part of a distributed job
///
/// Rank 0 gets every outcome in job order; other ranks get `None`.
pub fn run_rank(
    comm: &mut dyn Communicator,
    job: &Job,
    solver: &dyn PlateSolver,
    strategy: DistributionStrategy,
) -> std::result::Result<Option<Vec<PlateOutcome>>, HeatError> {
    distributor_for(strategy).distribute(comm, job, solver)
}

/// Rank 0's outcomes, or the error that ended the run
fn collect_outcomes(
    results: Vec<std::result::Result<Option<Vec<PlateOutcome>>, HeatError>>,
    debug: bool,
) -> Result<Vec<PlateOutcome>> {
    let mut results = results.into_iter();
    let root = results
        .next()
        .ok_or_else(|| HeatError::messaging("gather", "no rank 0 in the run"))?;

    if debug {
        for (rank, result) in results.enumerate() {
            if let Err(e) = result {
                eprintln!("DEBUG: Rank {} failed: {}", rank + 1, e);
            }
        }
    }

    match root? {
        Some(outcomes) => Ok(outcomes),
        None => Err(HeatError::messaging("gather", "rank 0 returned no outcomes").into()),
    }
}

/// Record outcomes, write the report and print the summary lines
pub fn finish_job(
    config: &Config,
    mut job: Job,
    outcomes: Vec<PlateOutcome>,
    processes: usize,
    clock: RunClock,
) -> Result<JobRun> {
    let wall_time = clock.elapsed();

    if outcomes.len() != job.len() {
        return Err(HeatError::messaging(
            "gather",
            format!("{} outcomes for {} plates", outcomes.len(), job.len()),
        )
        .into());
    }
    for (index, outcome) in outcomes.into_iter().enumerate() {
        job.record(index, outcome);
    }

    println!("Completed job in: {:.9}s", wall_time.as_secs_f64());

    let report_file = report_path(&config.output.report_dir, &job);
    write_report(&report_file, &job).context("Failed to write report")?;

    if let Some(json_path) = &config.output.json_output {
        let summary = build_job_summary(config, &job, processes, &report_file, clock.started_at, wall_time);
        write_json_output(json_path, &summary)?;
        println!("JSON summary written to: {}", json_path.display());
    }

    let skipped = job
        .outcomes()
        .filter(|outcome| matches!(outcome, Some(PlateOutcome::Skipped { .. })))
        .count();
    if skipped > 0 {
        eprintln!("Warning: {} of {} plates were skipped", skipped, job.len());
    }

    println!("Results stored in: {}", report_file.display());

    Ok(JobRun {
        job,
        report_file,
        wall_time,
    })
}

/// Dry run: show who would solve what
pub fn print_plan(config: &Config, job: &Job, processes: usize) {
    println!("Job: {} ({} plates)", job.path.display(), job.len());

    if processes == 1 {
        println!("  All plates solved in this process");
    } else {
        match config.workers.strategy {
            DistributionStrategy::Static => {
                for (rank, block) in partition_all(job.len(), processes).unwrap_or_default().iter().enumerate() {
                    if block.is_empty() {
                        println!("  Rank {}: no plates", rank);
                    } else {
                        println!("  Rank {}: plates {}..{}", rank, block.start, block.finish);
                    }
                }
            }
            DistributionStrategy::Dynamic => {
                println!("  Rank 0 coordinates; {} workers pull plates one at a time", processes - 1);
            }
        }
    }

    for (index, plate) in job.plates.iter().enumerate() {
        println!(
            "  [{}] {} (time step {}s, diffusivity {}, spacing {}, epsilon {})",
            index, plate.file_name, plate.time_step, plate.diffusivity, plate.spacing, plate.epsilon
        );
    }

    println!();
    println!("Dry run mode - job validated successfully");
}
