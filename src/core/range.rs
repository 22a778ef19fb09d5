// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Partitioning of an index range among workers.

use crossbeam_utils::CachePadded;
use std::iter::StepBy;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns the indices of the global range `(0..).step_by(step)` that fall in
/// the given block.
///
/// The start of the block is rounded up to the next multiple of `step`, so
/// that splitting `0..n` into consecutive blocks and stepping through each of
/// them visits the same indices as stepping through `0..n` directly.
pub fn stepped(block: std::ops::Range<usize>, step: usize) -> StepBy<std::ops::Range<usize>> {
    debug_assert!(step != 0);
    let start = match block.start % step {
        0 => block.start,
        rem => block.start.saturating_add(step - rem),
    };
    (start..block.end.max(start)).step_by(step)
}

/// A partition of `0..num_elements` into one fixed block per worker.
///
/// All blocks have `num_elements / num_workers` elements, except the last one
/// which also absorbs the remainder.
#[derive(Clone, Copy, Debug)]
pub struct StaticPartition {
    /// Total number of elements.
    num_elements: usize,
    /// Number of workers (and blocks).
    num_workers: usize,
    /// Distance between two visited indices.
    step: usize,
}

// Here is a proof that `StaticPartition` visits each index of
// `(0..num_elements).step_by(step)` exactly once.
//
// With `q = num_elements / num_workers`, block `k < num_workers - 1` is
// `k*q..(k+1)*q` and the last block is `(num_workers-1)*q..num_elements`.
// These blocks are consecutive, don't overlap, and cover `0..num_elements`
// because `(num_workers-1)*q <= num_elements`. `stepped()` then selects in each
// block exactly the multiples of `step` that it contains.
impl StaticPartition {
    /// Creates a partition of `0..num_elements` among `num_workers` workers.
    pub fn new(num_elements: usize, num_workers: usize, step: usize) -> Self {
        debug_assert!(num_workers != 0);
        Self {
            num_elements,
            num_workers,
            step,
        }
    }

    /// Returns the block of the given worker.
    pub fn block(&self, worker_id: usize) -> std::ops::Range<usize> {
        let block_len = self.num_elements / self.num_workers;
        let start = worker_id * block_len;
        let end = if worker_id + 1 == self.num_workers {
            self.num_elements
        } else {
            start + block_len
        };
        start..end
    }

    /// Returns the indices that the given worker must visit.
    pub fn indices(&self, worker_id: usize) -> StepBy<std::ops::Range<usize>> {
        stepped(self.block(worker_id), self.step)
    }
}

/// A contiguous chunk of indices, claimed and processed by a single worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Granule {
    /// Index of this granule, which is also the index of its state.
    pub id: usize,
    /// Elements covered by this granule.
    pub range: std::ops::Range<usize>,
}

/// Hands out the granules of `0..num_elements` to workers.
///
/// Claiming a granule is a single atomic increment of a shared counter: each
/// granule index is returned by at most one call to [`claim()`](Self::claim),
/// and all of them are returned if workers claim until exhaustion.
pub struct GranuleTable {
    /// Total number of elements.
    num_elements: usize,
    /// Number of elements per granule.
    granularity: usize,
    /// Distance between two visited indices.
    step: usize,
    /// Number of granules.
    num_granules: usize,
    /// Index of the next granule to hand out. May exceed `num_granules` once
    /// all granules have been claimed.
    next: CachePadded<AtomicUsize>,
    /// Number of granules that have been fully processed.
    completed: CachePadded<AtomicUsize>,
}

impl GranuleTable {
    /// Creates a table of granules of the given size covering
    /// `0..num_elements`.
    pub fn new(num_elements: usize, granularity: usize, step: usize) -> Self {
        debug_assert!(granularity != 0);
        Self {
            num_elements,
            granularity,
            step,
            num_granules: num_elements.div_ceil(granularity),
            next: CachePadded::new(AtomicUsize::new(0)),
            completed: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of granules.
    pub fn num_granules(&self) -> usize {
        self.num_granules
    }

    /// Returns the granule with the given index. The last granule is clamped
    /// to `num_elements`.
    pub fn granule(&self, id: usize) -> Granule {
        debug_assert!(id < self.num_granules);
        let start = id * self.granularity;
        let end = start.saturating_add(self.granularity).min(self.num_elements);
        Granule {
            id,
            range: start..end,
        }
    }

    /// Claims the next unprocessed granule, or returns [`None`] if all of them
    /// have already been claimed.
    pub fn claim(&self) -> Option<Granule> {
        // Workers stop claiming after the first failure, so the counter grows
        // past `num_granules` by at most one per worker.
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id < self.num_granules {
            Some(self.granule(id))
        } else {
            None
        }
    }

    /// Returns the indices to visit in the given granule.
    pub fn indices(&self, granule: &Granule) -> StepBy<std::ops::Range<usize>> {
        stepped(granule.range.clone(), self.step)
    }

    /// Marks one more granule as fully processed.
    pub fn complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of granules fully processed so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}
