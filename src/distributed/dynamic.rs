//! Dynamic plate distribution
//!
//! Rank 0 only coordinates. It hands each worker one plate index, then
//! answers every completion with the next unassigned index until none are
//! left. Faster workers therefore solve more plates.
//!
//! The stop signal is an assignment of index `job.len()`, one past the last
//! plate. Workers that start out with nothing to do get it immediately; the
//! rest get it once every plate is done.

use super::protocol::{ErrorMessage, Message};
use super::transport::{Communicator, Source};
use super::{report_failure, solve_locally, PlateDistributor};
use crate::error::HeatError;
use crate::job::{Job, PlateOutcome};
use crate::solver::PlateSolver;
use std::collections::HashMap;

/// Pull-based master/worker assignment
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicDistributor;

impl PlateDistributor for DynamicDistributor {
    fn distribute(
        &self,
        comm: &mut dyn Communicator,
        job: &Job,
        solver: &dyn PlateSolver,
    ) -> Result<Option<Vec<PlateOutcome>>, HeatError> {
        if comm.size() == 1 {
            return solve_locally(job, solver, 0..job.len()).map(Some);
        }

        if comm.rank() == 0 {
            let mut coordinator = Coordinator::new(job.len(), comm.size());
            match coordinator.run(comm) {
                Ok(outcomes) => Ok(Some(outcomes)),
                Err(e) => {
                    coordinator.abort_workers(comm, &e);
                    Err(e)
                }
            }
        } else {
            match work(comm, job, solver) {
                Ok(()) => Ok(None),
                Err(e) => {
                    report_failure(comm, &e);
                    Err(e)
                }
            }
        }
    }
}

/// Rank 0 bookkeeping
struct Coordinator {
    plates: usize,
    workers: usize,
    next: usize,
    /// Worker rank -> plate it is solving
    in_progress: HashMap<usize, usize>,
    /// Plate index -> outcome
    completed: Vec<Option<PlateOutcome>>,
    /// Workers that already got the stop signal
    stopped: Vec<bool>,
}

impl Coordinator {
    fn new(plates: usize, size: usize) -> Self {
        Self {
            plates,
            workers: size - 1,
            next: 0,
            in_progress: HashMap::new(),
            completed: vec![None; plates],
            stopped: vec![false; size],
        }
    }

    fn sentinel(&self) -> usize {
        self.plates
    }

    /// Give `worker` the next plate, or stop it if none are left
    fn feed(&mut self, comm: &mut dyn Communicator, worker: usize) -> Result<(), HeatError> {
        if self.next < self.plates {
            comm.send(worker, &Message::Assign { plate_index: self.next })?;
            self.in_progress.insert(worker, self.next);
            self.next += 1;
        } else {
            self.stop(comm, worker)?;
        }
        Ok(())
    }

    fn stop(&mut self, comm: &mut dyn Communicator, worker: usize) -> Result<(), HeatError> {
        comm.send(worker, &Message::Assign { plate_index: self.sentinel() })?;
        self.stopped[worker] = true;
        Ok(())
    }

    fn run(&mut self, comm: &mut dyn Communicator) -> Result<Vec<PlateOutcome>, HeatError> {
        // Initial round: one plate per worker, surplus workers stop at once
        for worker in 1..=self.workers {
            if self.next < self.plates {
                self.feed(comm, worker)?;
            } else {
                self.stop(comm, worker)?;
            }
        }

        let mut idle = Vec::new();
        while !self.in_progress.is_empty() {
            let envelope = comm.recv(Source::Any)?;
            let worker = envelope.source;

            match envelope.message {
                Message::Completed { plate_index, outcome } => {
                    self.complete(worker, plate_index, outcome)?;
                    if self.next < self.plates {
                        self.feed(comm, worker)?;
                    } else {
                        idle.push(worker);
                    }
                }
                Message::Error(ErrorMessage { rank, error }) => {
                    self.in_progress.remove(&worker);
                    self.stopped[worker] = true;
                    return Err(HeatError::RemoteFailure { rank, message: error });
                }
                other => {
                    return Err(HeatError::messaging(
                        "dynamic distribution",
                        format!("unexpected {} from rank {}", other.kind(), worker),
                    ));
                }
            }
        }

        for worker in idle {
            self.stop(comm, worker)?;
        }

        let completed = std::mem::take(&mut self.completed);
        completed
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.ok_or_else(|| {
                    HeatError::messaging("dynamic distribution", format!("plate {} was never completed", index))
                })
            })
            .collect()
    }

    fn complete(&mut self, worker: usize, plate_index: usize, outcome: PlateOutcome) -> Result<(), HeatError> {
        if plate_index >= self.plates {
            return Err(HeatError::messaging(
                "dynamic distribution",
                format!("rank {} completed plate {} of {}", worker, plate_index, self.plates),
            ));
        }
        match self.in_progress.remove(&worker) {
            Some(assigned) if assigned == plate_index => {}
            Some(assigned) => {
                return Err(HeatError::messaging(
                    "dynamic distribution",
                    format!("rank {} completed plate {} but was assigned {}", worker, plate_index, assigned),
                ));
            }
            None => {
                return Err(HeatError::messaging(
                    "dynamic distribution",
                    format!("rank {} completed plate {} without an assignment", worker, plate_index),
                ));
            }
        }
        if self.completed[plate_index].is_some() {
            return Err(HeatError::messaging(
                "dynamic distribution",
                format!("plate {} completed twice", plate_index),
            ));
        }
        self.completed[plate_index] = Some(outcome);
        Ok(())
    }

    /// Tell every worker still running that the run is over
    fn abort_workers(&self, comm: &mut dyn Communicator, err: &HeatError) {
        let notice = Message::Error(ErrorMessage {
            rank: comm.rank(),
            error: err.to_string(),
        });
        for worker in 1..=self.workers {
            if !self.stopped[worker] {
                // Best effort: the worker may already be gone
                let _ = comm.send(worker, &notice);
            }
        }
    }
}

/// Worker loop: solve whatever rank 0 assigns until told to stop
fn work(comm: &mut dyn Communicator, job: &Job, solver: &dyn PlateSolver) -> Result<(), HeatError> {
    loop {
        let envelope = comm.recv(Source::Rank(0))?;
        match envelope.message {
            Message::Assign { plate_index } if plate_index == job.len() => return Ok(()),
            Message::Assign { plate_index } if plate_index < job.len() => {
                let outcome = solver.solve(job, plate_index)?;
                comm.send(0, &Message::Completed { plate_index, outcome })?;
            }
            Message::Assign { plate_index } => {
                return Err(HeatError::messaging(
                    "dynamic work",
                    format!("assigned plate {} of {}", plate_index, job.len()),
                ));
            }
            Message::Error(ErrorMessage { rank, error }) => {
                return Err(HeatError::RemoteFailure { rank, message: error });
            }
            other => {
                return Err(HeatError::messaging(
                    "dynamic work",
                    format!("unexpected {} from rank 0", other.kind()),
                ));
            }
        }
    }
}
