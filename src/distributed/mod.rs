//! Multi-process plate distribution
//!
//! A run is a set of ranks. Rank 0 reads the job, decides who solves which
//! plate and collects every outcome; the other ranks are workers.
//!
//! # Layers
//!
//! - `protocol`: message definitions and length-prefixed MessagePack framing
//! - `transport`: the [`Communicator`] trait and the shared mailbox
//! - `local`: ranks as threads of one process
//! - `tcp`: ranks as node services connected to a coordinator
//! - `static_partition` / `dynamic`: the two [`PlateDistributor`] strategies
//! - `node_service` / `coordinator`: the two ends of a TCP run

pub mod coordinator;
pub mod dynamic;
pub mod local;
pub mod node_service;
pub mod protocol;
pub mod static_partition;
pub mod tcp;
pub mod transport;

use crate::config::DistributionStrategy;
use crate::error::HeatError;
use crate::job::{Job, PlateOutcome};
use crate::solver::PlateSolver;
use std::ops::Range;

pub use coordinator::DistributedCoordinator;
pub use dynamic::DynamicDistributor;
pub use local::{LocalCluster, LocalCommunicator};
pub use node_service::NodeService;
pub use protocol::{ErrorMessage, Message, ReadyMessage, SessionMessage, PROTOCOL_VERSION};
pub use static_partition::StaticDistributor;
pub use tcp::TcpCommunicator;
pub use transport::{Communicator, Envelope, Source};

/// Divides the plates of a job among the ranks of a run
///
/// Every rank calls [`distribute`](Self::distribute) with the same job.
/// Rank 0 gets `Some` with one outcome per plate, in job order; the other
/// ranks get `None` once their share is done.
///
/// A rank that fails tells rank 0 before returning its error, and rank 0
/// turns that report into [`HeatError::RemoteFailure`].
pub trait PlateDistributor {
    fn distribute(
        &self,
        comm: &mut dyn Communicator,
        job: &Job,
        solver: &dyn PlateSolver,
    ) -> Result<Option<Vec<PlateOutcome>>, HeatError>;
}

/// Distributor implementing `strategy`
pub fn distributor_for(strategy: DistributionStrategy) -> Box<dyn PlateDistributor> {
    match strategy {
        DistributionStrategy::Static => Box::new(StaticDistributor),
        DistributionStrategy::Dynamic => Box::new(DynamicDistributor),
    }
}

/// Solve plates `range` of `job` in order on this rank
pub fn solve_locally(job: &Job, solver: &dyn PlateSolver, range: Range<usize>) -> Result<Vec<PlateOutcome>, HeatError> {
    range.map(|index| solver.solve(job, index)).collect()
}

/// Tell rank 0 that this rank is giving up
///
/// Best effort: if rank 0 is unreachable the caller's error is still the
/// one that matters.
pub(crate) fn report_failure(comm: &mut dyn Communicator, err: &HeatError) {
    let notice = Message::Error(ErrorMessage {
        rank: comm.rank(),
        error: err.to_string(),
    });
    if let Err(e) = comm.send(0, &notice) {
        eprintln!("Warning: Could not report failure to rank 0: {}", e);
    }
}

/// Node identifier (hostname)
pub fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mock::MockSolver;
    use std::path::Path;

    fn job(plates: usize) -> Job {
        let text: String = (0..plates).map(|i| format!("p{}.bin 1 1 1 1\n", i)).collect();
        Job::parse(Path::new("job.txt"), &text).unwrap()
    }

    #[test]
    fn test_strategies_agree() {
        let job = job(9);
        let solver = MockSolver::new();

        let gather = |strategy| {
            let results = LocalCluster::run(3, |mut comm| {
                distributor_for(strategy).distribute(&mut comm, &job, &solver)
            })
            .unwrap();
            results.into_iter().next().unwrap().unwrap().unwrap()
        };

        let local = solve_locally(&job, &solver, 0..job.len()).unwrap();
        assert_eq!(gather(DistributionStrategy::Static), local);
        assert_eq!(gather(DistributionStrategy::Dynamic), local);
    }

    #[test]
    fn test_solve_locally_stops_at_first_failure() {
        let job = job(5);
        let solver = MockSolver::new();
        solver.fail_on(2);

        assert!(solve_locally(&job, &solver, 0..5).is_err());
        assert_eq!(solver.solved(), vec![0, 1, 2]);
    }

    #[test]
    fn test_node_id_not_empty() {
        assert!(!get_node_id().is_empty());
    }
}
