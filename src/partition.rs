//! Static block partitioning
//!
//! Splits `total` units of work among `workers` ranks into contiguous,
//! non-overlapping ranges. The first `total % workers` ranks receive one extra
//! unit, so no two ranges differ in length by more than one.
//!
//! The same map is used for interior grid rows (one range per thread) and for
//! plate indices (one range per process).
//!
//! ```
//! use heatplate::partition::Partition;
//!
//! // 10 units over 4 workers: 3, 3, 2, 2
//! assert_eq!(Partition::of(0, 10, 4)?.range(), 0..3);
//! assert_eq!(Partition::of(1, 10, 4)?.range(), 3..6);
//! assert_eq!(Partition::of(2, 10, 4)?.range(), 6..8);
//! assert_eq!(Partition::of(3, 10, 4)?.range(), 8..10);
//! # Ok::<(), heatplate::error::HeatError>(())
//! ```

use crate::error::HeatError;
use std::ops::Range;

/// A `[start, finish)` slice of the work assigned to one rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: usize,
    pub finish: usize,
}

impl Partition {
    /// Compute the range owned by `rank`
    ///
    /// # Errors
    ///
    /// [`HeatError::InvalidArgument`] if `workers` is zero or `rank >= workers`.
    pub fn of(rank: usize, total: usize, workers: usize) -> Result<Self, HeatError> {
        if workers == 0 {
            return Err(HeatError::InvalidArgument(
                "partition requires at least one worker".to_string(),
            ));
        }
        if rank >= workers {
            return Err(HeatError::InvalidArgument(format!(
                "rank {} out of range for {} workers",
                rank, workers
            )));
        }

        Ok(Self {
            start: block_start(rank, total, workers),
            finish: block_start(rank + 1, total, workers),
        })
    }

    /// Number of units in this range
    pub fn len(&self) -> usize {
        self.finish - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.finish
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.finish
    }

    /// Shift the range by `base`
    ///
    /// Interior rows begin at row 1, so row ranges are computed over
    /// `0..interior` and shifted by one.
    pub fn offset(self, base: usize) -> Self {
        Self {
            start: self.start + base,
            finish: self.finish + base,
        }
    }
}

/// First unit owned by `rank` (also the exclusive end of `rank - 1`)
fn block_start(rank: usize, total: usize, workers: usize) -> usize {
    rank * (total / workers) + rank.min(total % workers)
}

/// Every rank's range, in rank order
pub fn partition_all(total: usize, workers: usize) -> Result<Vec<Partition>, HeatError> {
    (0..workers)
        .map(|rank| Partition::of(rank, total, workers))
        .collect()
}
