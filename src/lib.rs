//! heatplate - parallel heat diffusion on plates
//!
//! Simulates two-dimensional heat transfer on rectangular plates until each
//! reaches thermal equilibrium, then reports how many time steps that took
//! and how much simulated time passed.
//!
//! # Architecture
//!
//! - **Within a plate**: a pool of threads relaxes disjoint row bands of a
//!   double-buffered grid, meeting at two barriers per round
//! - **Across plates**: ranks divide the job's plates statically (contiguous
//!   blocks) or dynamically (rank 0 hands out one plate at a time)
//! - **Ranks**: threads of one process in standalone mode, or node services
//!   driven by a coordinator over TCP

pub mod config;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod grid;
pub mod job;
pub mod output;
pub mod partition;
pub mod plate_io;
pub mod simulation;
pub mod solver;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use engine::Engine;
pub use error::HeatError;
pub use grid::Grid;
pub use job::{Job, Plate, PlateOutcome};

/// Result type used by the application layer
pub type Result<T> = anyhow::Result<T>;
