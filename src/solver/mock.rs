//! Mock plate solver for testing
//!
//! Answers instantly without touching the file system, records which plates
//! it was asked to solve and can be told to fail on chosen plates. Clones
//! share their records, so a test can keep one handle while the ranks of a
//! cluster use others.
//!
//! ```
//! use heatplate::job::{Job, PlateOutcome};
//! use heatplate::solver::PlateSolver;
//! use heatplate::solver::mock::MockSolver;
//! use std::path::Path;
//!
//! let job = Job::parse(Path::new("job.txt"), "a.bin 1 1 1 1\nb.bin 1 1 1 1\n").unwrap();
//! let solver = MockSolver::new();
//!
//! assert_eq!(solver.solve(&job, 1).unwrap(), PlateOutcome::Equilibrated { states: 2 });
//! assert_eq!(solver.solved(), vec![1]);
//! ```

use super::PlateSolver;
use crate::error::HeatError;
use crate::job::{Job, PlateOutcome};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory [`PlateSolver`]
#[derive(Debug, Clone, Default)]
pub struct MockSolver {
    /// Plate indices solved so far, in call order
    solved: Arc<Mutex<Vec<usize>>>,

    /// Plates that fail with a malformed-input error
    failing: Arc<Mutex<HashSet<usize>>>,

    /// Artificial work time per plate
    delay: Option<Duration>,
}

impl MockSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long per plate, to make ranks finish out of order
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make plate `index` fail
    pub fn fail_on(&self, index: usize) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index);
    }

    /// States reported for plate `index`
    pub fn states_for(index: usize) -> u64 {
        index as u64 + 1
    }

    /// Plate indices solved so far, in call order
    pub fn solved(&self) -> Vec<usize> {
        self.solved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PlateSolver for MockSolver {
    fn solve(&self, job: &Job, index: usize) -> Result<PlateOutcome, HeatError> {
        if let Some(delay) = self.delay {
            // Vary the delay so completions interleave
            std::thread::sleep(delay * (index as u32 % 3 + 1));
        }

        self.solved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(index);

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&index);
        if failing {
            return Err(HeatError::MalformedInput {
                path: PathBuf::from(&job.plates[index].file_name),
                reason: "mock failure".to_string(),
            });
        }

        Ok(PlateOutcome::Equilibrated {
            states: Self::states_for(index),
        })
    }
}
