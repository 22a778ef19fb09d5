// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Loop configuration.

use crate::core::{run_dynamic, run_static, WorkerPool, PINNING_SUPPORTED};
use crate::error::{ConfigError, Error};
use crate::macros::log_debug;
use std::convert::Infallible;
use std::num::NonZeroUsize;

/// Number of worker threads to spawn for a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl ThreadCount {
    /// Resolves the number of threads to spawn.
    pub fn count(self) -> Result<NonZeroUsize, ConfigError> {
        match self {
            ThreadCount::AvailableParallelism => {
                std::thread::available_parallelism().map_err(ConfigError::AvailableParallelism)
            }
            ThreadCount::Count(count) => Ok(count),
        }
    }
}

impl TryFrom<usize> for ThreadCount {
    type Error = ConfigError;

    fn try_from(thread_count: usize) -> Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count).map_err(|_| ConfigError::ZeroWorkers)?;
        Ok(ThreadCount::Count(count))
    }
}

/// Strategy to distribute the indices of a loop among worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Each worker processes one fixed contiguous block of indices, with one
    /// state object per worker.
    Static,
    /// Workers repeatedly claim granules of `granularity` consecutive indices
    /// until none remain, with one state object per granule.
    Dynamic {
        /// Number of consecutive indices in a granule. The last granule may be
        /// shorter.
        granularity: NonZeroUsize,
    },
}

impl Schedule {
    /// Creates a dynamic schedule with the given granularity, which must be
    /// positive.
    pub fn dynamic(granularity: usize) -> Result<Self, ConfigError> {
        let granularity =
            NonZeroUsize::try_from(granularity).map_err(|_| ConfigError::ZeroGranularity)?;
        Ok(Schedule::Dynamic { granularity })
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), running a loop fails with
    /// [`ConfigError::PinningUnsupported`].
    Always,
}

/// Configuration of a parallel loop over `0..n`.
///
/// ```
/// # use parloop::{CpuPinningPolicy, LoopBuilder, Schedule, ThreadCount};
/// let builder = LoopBuilder {
///     num_threads: ThreadCount::try_from(4).unwrap(),
///     schedule: Schedule::dynamic(16).unwrap(),
///     step: 1,
///     cpu_pinning: CpuPinningPolicy::No,
/// };
///
/// let mut sum = 0;
/// builder
///     .run(
///         1_000,
///         |_partial: &mut u64| {},
///         |i, partial| *partial += i as u64,
///         |partial| sum += partial,
///     )
///     .unwrap();
/// assert_eq!(sum, 999 * 1_000 / 2);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct LoopBuilder {
    /// Number of worker threads to spawn for each loop.
    pub num_threads: ThreadCount,
    /// Strategy to distribute indices among threads.
    pub schedule: Schedule,
    /// Distance between two consecutive visited indices.
    pub step: usize,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self {
            num_threads: ThreadCount::AvailableParallelism,
            schedule: Schedule::Static,
            step: 1,
            cpu_pinning: CpuPinningPolicy::No,
        }
    }
}

impl LoopBuilder {
    /// Runs a loop over the indices `0, step, 2 * step, ...` below `n`.
    ///
    /// One state object of type `S` is created with [`Default`] per worker
    /// (static schedule) or per granule (dynamic schedule). The hooks are
    /// called as follows:
    /// - `before` on every state, one after the other on the calling thread,
    ///   before any worker starts,
    /// - `body` on each index in parallel, with exclusive access to the state
    ///   of the worker or granule that owns this index,
    /// - `after` on every state, one after the other on the calling thread,
    ///   once all workers have been joined.
    ///
    /// A panic in `body` is re-raised on the calling thread after all workers
    /// have been joined.
    pub fn run<S: Default + Send>(
        &self,
        n: usize,
        mut before: impl FnMut(&mut S),
        body: impl Fn(usize, &mut S) + Sync,
        mut after: impl FnMut(S),
    ) -> Result<(), Error> {
        self.try_run::<S, Infallible>(
            n,
            |state| {
                before(state);
                Ok(())
            },
            |i, state| {
                body(i, state);
                Ok(())
            },
            |state| {
                after(state);
                Ok(())
            },
        )
    }

    /// Same as [`run()`](Self::run), with fallible hooks.
    ///
    /// The first error returned by a hook stops the loop:
    /// - an error from `before` or `after` is returned immediately,
    /// - an error from `body` makes all workers stop at their next index, and
    ///   is returned once all workers have been joined. Subsequent errors from
    ///   other workers are discarded, and `after` isn't called.
    pub fn try_run<S: Default + Send, E: Send>(
        &self,
        n: usize,
        before: impl FnMut(&mut S) -> Result<(), E>,
        body: impl Fn(usize, &mut S) -> Result<(), E> + Sync,
        after: impl FnMut(S) -> Result<(), E>,
    ) -> Result<(), Error<E>> {
        let pool = self.validate().map_err(|e| e.widen())?;
        log_debug!(
            "[main thread] Running a loop over {n} indices with {:?}, step {}, {:?}",
            self.schedule,
            self.step,
            self.num_threads
        );
        match self.schedule {
            Schedule::Static => run_static(&pool, self.step, n, before, body, after),
            Schedule::Dynamic { granularity } => run_dynamic(
                &pool,
                self.step,
                n,
                granularity.get(),
                before,
                body,
                after,
            ),
        }
    }

    /// Checks this configuration and prepares a pool of workers for it.
    fn validate(&self) -> Result<WorkerPool, Error> {
        if self.step == 0 {
            return Err(ConfigError::ZeroStep.into());
        }
        if self.cpu_pinning == CpuPinningPolicy::Always && !PINNING_SUPPORTED {
            return Err(ConfigError::PinningUnsupported.into());
        }
        let num_threads = self.num_threads.count()?;
        Ok(WorkerPool::new(num_threads, self.cpu_pinning))
    }
}
