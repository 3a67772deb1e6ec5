//! Static plate distribution
//!
//! Every rank solves the contiguous block of plates [`Partition::of`] gives
//! it, with no coordination up front. Workers then send their block's
//! outcomes to rank 0 in one message, and rank 0 stitches the blocks
//! together in rank order.

use super::protocol::{ErrorMessage, Message};
use super::transport::{Communicator, Source};
use super::{report_failure, solve_locally, PlateDistributor};
use crate::error::HeatError;
use crate::job::{Job, PlateOutcome};
use crate::partition::Partition;
use crate::solver::PlateSolver;

/// Contiguous block per rank
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDistributor;

impl PlateDistributor for StaticDistributor {
    fn distribute(
        &self,
        comm: &mut dyn Communicator,
        job: &Job,
        solver: &dyn PlateSolver,
    ) -> Result<Option<Vec<PlateOutcome>>, HeatError> {
        let (rank, size) = (comm.rank(), comm.size());
        let block = Partition::of(rank, job.len(), size)?;
        let local = solve_locally(job, solver, block.range());

        if rank != 0 {
            let outcomes = match local {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    report_failure(comm, &e);
                    return Err(e);
                }
            };
            comm.send(
                0,
                &Message::StateCounts {
                    start: block.start,
                    outcomes,
                },
            )?;
            return Ok(None);
        }

        let mut all = local?;
        all.reserve(job.len() - all.len());

        for peer in 1..size {
            let expected = Partition::of(peer, job.len(), size)?;
            let envelope = comm.recv(Source::Rank(peer))?;

            match envelope.message {
                Message::StateCounts { start, outcomes }
                    if start == expected.start && outcomes.len() == expected.len() =>
                {
                    all.extend(outcomes);
                }
                Message::StateCounts { start, outcomes } => {
                    return Err(HeatError::messaging(
                        "static gather",
                        format!(
                            "rank {} sent {} outcomes from plate {}, expected {} from plate {}",
                            peer,
                            outcomes.len(),
                            start,
                            expected.len(),
                            expected.start
                        ),
                    ));
                }
                Message::Error(ErrorMessage { rank, error }) => {
                    return Err(HeatError::RemoteFailure { rank, message: error });
                }
                other => {
                    return Err(HeatError::messaging(
                        "static gather",
                        format!("unexpected {} from rank {}", other.kind(), peer),
                    ));
                }
            }
        }

        Ok(Some(all))
    }
}
