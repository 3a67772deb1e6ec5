//! Per-plate work unit
//!
//! The distribution strategies hand out plate indices; a [`PlateSolver`] turns
//! one index into an outcome. [`FileSolver`] is the real implementation: load
//! the plate file, equilibrate it, persist the final state and free the grid.
//! [`mock::MockSolver`] replaces it in tests of the distribution layer.

pub mod mock;

use crate::config::PlateErrorPolicy;
use crate::engine::Engine;
use crate::error::HeatError;
use crate::job::{Job, PlateOutcome};
use crate::plate_io::{load_plate_grid, output_path, store_plate_grid};
use std::path::PathBuf;

/// Solves single plates of a job
///
/// Implementations are shared by every rank of an in-process cluster, so
/// they must be `Sync`.
pub trait PlateSolver: Send + Sync {
    /// Process plate `index` of `job` to completion
    fn solve(&self, job: &Job, index: usize) -> Result<PlateOutcome, HeatError>;
}

/// Loads plates from disk and writes their equilibrium state back
#[derive(Debug, Clone)]
pub struct FileSolver {
    engine: Engine,
    output_dir: PathBuf,
    on_error: PlateErrorPolicy,
}

impl FileSolver {
    pub fn new(engine: Engine, output_dir: impl Into<PathBuf>, on_error: PlateErrorPolicy) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            on_error,
        }
    }

    fn equilibrate(&self, job: &Job, index: usize) -> Result<u64, HeatError> {
        let plate = &job.plates[index];
        let mut grid = load_plate_grid(&job.plate_path(index))?;

        let report = self.engine.equilibrate(&mut grid, plate.params())?;
        println!(
            "Equilibrated plate {} ({}) in: {:.9}s",
            index,
            plate.file_name,
            report.wall_time.as_secs_f64()
        );

        store_plate_grid(&output_path(&self.output_dir, &plate.stem(), report.states), &grid)?;
        grid.release();

        Ok(report.states)
    }
}

impl PlateSolver for FileSolver {
    fn solve(&self, job: &Job, index: usize) -> Result<PlateOutcome, HeatError> {
        match self.equilibrate(job, index) {
            Ok(states) => Ok(PlateOutcome::Equilibrated { states }),
            Err(e) if e.is_plate_local() && self.on_error == PlateErrorPolicy::Skip => {
                eprintln!("Warning: Skipping plate {} ({}): {}", index, job.plates[index].file_name, e);
                Ok(PlateOutcome::Skipped { reason: e.to_string() })
            }
            Err(e) => Err(e),
        }
    }
}
