// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Static and dynamic scheduling of a loop on a [`WorkerPool`].

use super::arena::GranuleArena;
use super::pool::WorkerPool;
use super::range::{GranuleTable, StaticPartition};
use crate::error::Error;
use crate::macros::{log_debug, log_info, log_trace};

/// Runs a loop with one fixed block of indices and one state per worker.
///
/// States are initialized by `before` in worker order before any thread is
/// spawned, and finalized by `after` in worker order once all threads are
/// joined.
pub fn run_static<S: Default + Send, E: Send>(
    pool: &WorkerPool,
    step: usize,
    n: usize,
    mut before: impl FnMut(&mut S) -> Result<(), E>,
    body: impl Fn(usize, &mut S) -> Result<(), E> + Sync,
    mut after: impl FnMut(S) -> Result<(), E>,
) -> Result<(), Error<E>> {
    let num_workers = pool.num_threads();
    let partition = StaticPartition::new(n, num_workers, step);

    let mut states = (0..num_workers)
        .map(|_| S::default())
        .collect::<Vec<S>>();
    for state in states.iter_mut() {
        before(state).map_err(Error::Callback)?;
    }
    log_debug!("[main thread] Initialized {num_workers} worker states");

    pool.execute::<_, E>(states.iter_mut().collect(), |id, state, failures| {
        let mut _visited = 0usize;
        for i in partition.indices(id) {
            if failures.should_stop() {
                log_debug!("[thread {id}] Stopping early after a failure");
                break;
            }
            body(i, &mut *state)?;
            _visited += 1;
        }
        log_info!(
            "[thread {id}] Visited {_visited} indices in block {:?}",
            partition.block(id)
        );
        Ok(())
    })?;

    for state in states {
        after(state).map_err(Error::Callback)?;
    }
    log_debug!("[main thread] Finalized {num_workers} worker states");
    Ok(())
}

/// Runs a loop where workers claim granules of `granularity` indices until
/// none remain, with one state per granule.
///
/// States are initialized by `before` in granule order before any thread is
/// spawned, and finalized by `after` in granule order once all threads are
/// joined.
pub fn run_dynamic<S: Default + Send, E: Send>(
    pool: &WorkerPool,
    step: usize,
    n: usize,
    granularity: usize,
    before: impl FnMut(&mut S) -> Result<(), E>,
    body: impl Fn(usize, &mut S) -> Result<(), E> + Sync,
    mut after: impl FnMut(S) -> Result<(), E>,
) -> Result<(), Error<E>> {
    let table = GranuleTable::new(n, granularity, step);
    let arena = GranuleArena::new(table.num_granules(), before).map_err(Error::Callback)?;
    log_debug!(
        "[main thread] Initialized {} granule states",
        arena.num_slots()
    );

    pool.execute::<_, E>(vec![(); pool.num_threads()], |id, (), failures| {
        let mut _claimed = 0usize;
        while !failures.should_stop() {
            let Some(granule) = table.claim() else {
                break;
            };
            log_trace!(
                "[thread {id}] Claimed granule #{} = {:?}",
                granule.id,
                granule.range
            );
            let mut state = arena.checkout(granule.id);
            for i in table.indices(&granule) {
                if failures.should_stop() {
                    log_debug!("[thread {id}] Stopping early after a failure");
                    return Ok(());
                }
                body(i, &mut *state)?;
            }
            drop(state);
            table.complete();
            _claimed += 1;
        }
        log_info!("[thread {id}] Processed {_claimed} granules");
        Ok(())
    })?;

    debug_assert_eq!(table.completed(), table.num_granules());
    for state in arena.into_states() {
        after(state).map_err(Error::Callback)?;
    }
    log_debug!(
        "[main thread] Finalized {} granule states",
        table.num_granules()
    );
    Ok(())
}
