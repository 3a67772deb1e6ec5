//! Barrier-synchronized worker rounds
//!
//! All state shared by the workers of one equilibration lives in a
//! [`RoundState`] borrowed by every thread of a [`std::thread::scope`].

use super::RelaxationParams;
use crate::error::HeatError;
use crate::grid::{Grid, SharedGrid};
use crate::partition::Partition;
use std::io;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Barrier, Condvar, Mutex};
use std::thread;

/// Worker threads used for a grid with `interior_rows` rows to relax
///
/// Never more threads than rows, never fewer than one.
pub fn thread_count(requested: usize, interior_rows: usize) -> usize {
    requested.min(interior_rows).max(1)
}

/// Shared state of one equilibration
struct RoundState<'g> {
    grid: SharedGrid<'g>,
    params: RelaxationParams,
    /// AND of every worker's "my band is equilibrated" for the running round
    equilibrium: Mutex<bool>,
    /// Value of `equilibrium` at the end of the last completed round
    verdict: AtomicBool,
    states: AtomicU64,
    /// Everyone has swept and voted
    swept: Barrier,
    /// The leader has swapped and published the verdict
    published: Barrier,
}

impl RoundState<'_> {
    /// Record that some band moved by more than epsilon
    fn vote_not_equilibrated(&self) {
        // Workers never panic while holding the flag; a poisoned lock still
        // carries a valid bool
        let mut flag = self.equilibrium.lock().unwrap_or_else(|e| e.into_inner());
        *flag = false;
    }

    /// Bookkeeping done by the first barrier's leader while all others wait
    fn advance(&self) {
        self.states.fetch_add(1, Ordering::Relaxed);
        self.grid.swap();

        let mut flag = self.equilibrium.lock().unwrap_or_else(|e| e.into_inner());
        self.verdict.store(*flag, Ordering::Relaxed);
        *flag = true;
    }
}

/// Start signal for the worker threads
///
/// Workers block here before their first round. If any thread fails to spawn
/// the gate is aborted and the already running workers return without
/// touching a barrier.
struct LaunchGate {
    state: Mutex<Option<bool>>,
    changed: Condvar,
}

impl LaunchGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            changed: Condvar::new(),
        }
    }

    fn open(&self) {
        self.settle(true);
    }

    fn abort(&self) {
        self.settle(false);
    }

    fn settle(&self, go: bool) {
        // A poisoned gate still carries its value
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = Some(go);
        self.changed.notify_all();
    }

    /// Wait for the launch decision; `true` means start working
    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(go) = *state {
                return go;
            }
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Run `threads` workers over disjoint row bands until equilibrium
pub(super) fn equilibrate_threaded(grid: &mut Grid, params: RelaxationParams, threads: usize) -> Result<u64, HeatError> {
    equilibrate_with_spawn_limit(grid, params, threads, None)
}

/// Spawns at index `spawn_limit` and above fail as if the OS refused them.
fn equilibrate_with_spawn_limit(
    grid: &mut Grid,
    params: RelaxationParams,
    threads: usize,
    spawn_limit: Option<usize>,
) -> Result<u64, HeatError> {
    let interior = grid.interior_rows();
    let bands = (0..threads)
        .map(|rank| Partition::of(rank, interior, threads).map(|p| p.offset(1).range()))
        .collect::<Result<Vec<Range<usize>>, HeatError>>()?;

    let state = RoundState {
        grid: grid.share(),
        params,
        equilibrium: Mutex::new(true),
        verdict: AtomicBool::new(false),
        states: AtomicU64::new(0),
        swept: Barrier::new(threads),
        published: Barrier::new(threads),
    };
    let gate = LaunchGate::new();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        let mut spawn_failure = None;

        for (index, band) in bands.into_iter().enumerate() {
            let state = &state;
            let gate = &gate;
            let spawned = if spawn_limit.is_some_and(|limit| index >= limit) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"))
            } else {
                thread::Builder::new()
                    .name(format!("relax-{}", index))
                    .spawn_scoped(scope, move || {
                        if gate.wait() {
                            run_worker(state, band);
                        }
                    })
            };

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_failure = Some(HeatError::ThreadCreation {
                        index,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        if spawn_failure.is_some() {
            gate.abort();
        } else {
            gate.open();
        }

        let mut first_error = spawn_failure;
        for (index, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                first_error.get_or_insert(HeatError::ThreadCreation {
                    index,
                    reason: "worker thread panicked".to_string(),
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })?;

    let states = state.states.load(Ordering::Relaxed);
    drop(state);
    Ok(states)
}

/// Round loop of one worker thread
fn run_worker(state: &RoundState<'_>, band: Range<usize>) {
    loop {
        // SAFETY: bands are disjoint, and swap only happens between the two
        // barriers below, when no thread is sweeping.
        let biggest_change = unsafe { state.grid.sweep_rows(band.clone(), state.params.coefficient) };

        if biggest_change > state.params.epsilon {
            state.vote_not_equilibrated();
        }

        if state.swept.wait().is_leader() {
            state.advance();
        }
        state.published.wait();

        if state.verdict.load(Ordering::Relaxed) {
            return;
        }
    }
}
