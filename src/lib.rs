// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod config;
mod core;
mod error;
mod macros;
mod sequential;

pub use config::{CpuPinningPolicy, LoopBuilder, Schedule, ThreadCount};
pub use error::{ConfigError, Error};
pub use sequential::{sequential_for, try_sequential_for};

/// Runs `body` in parallel on the indices `0, step, 2 * step, ...` below `n`,
/// giving one fixed contiguous block of indices to each of `num_workers`
/// worker threads.
///
/// Worker `k` owns a state created with [`Default`], which `before`
/// initializes and `after` finalizes. Blocks have `n / num_workers` indices,
/// except the last one that extends to `n`. See [`LoopBuilder::run()`] for the
/// exact ordering of the hooks.
///
/// ```
/// # use parloop::parallel_for_static;
/// let mut sum = 0;
/// parallel_for_static(
///     1,
///     4,
///     101,
///     |partial: &mut u64| *partial = 0,
///     |i, partial| *partial += i as u64,
///     |partial| sum += partial,
/// )
/// .unwrap();
/// assert_eq!(sum, 5_050);
/// ```
pub fn parallel_for_static<S: Default + Send>(
    step: usize,
    num_workers: usize,
    n: usize,
    before: impl FnMut(&mut S),
    body: impl Fn(usize, &mut S) + Sync,
    after: impl FnMut(S),
) -> Result<(), Error> {
    LoopBuilder {
        num_threads: ThreadCount::try_from(num_workers)?,
        schedule: Schedule::Static,
        step,
        cpu_pinning: CpuPinningPolicy::No,
    }
    .run(n, before, body, after)
}

/// Same as [`parallel_for_static()`], with fallible hooks. See
/// [`LoopBuilder::try_run()`] for how errors are reported.
pub fn try_parallel_for_static<S: Default + Send, E: Send>(
    step: usize,
    num_workers: usize,
    n: usize,
    before: impl FnMut(&mut S) -> Result<(), E>,
    body: impl Fn(usize, &mut S) -> Result<(), E> + Sync,
    after: impl FnMut(S) -> Result<(), E>,
) -> Result<(), Error<E>> {
    LoopBuilder {
        num_threads: ThreadCount::try_from(num_workers)?,
        schedule: Schedule::Static,
        step,
        cpu_pinning: CpuPinningPolicy::No,
    }
    .try_run(n, before, body, after)
}

/// Runs `body` in parallel on the indices `0, step, 2 * step, ...` below `n`,
/// with `num_workers` worker threads that repeatedly claim granules of
/// `granularity` consecutive indices until none remain.
///
/// Each granule owns a state created with [`Default`], which `before`
/// initializes and `after` finalizes, so the number of states is
/// `n.div_ceil(granularity)` regardless of the number of workers. The last
/// granule stops at `n`. See [`LoopBuilder::run()`] for the exact ordering of
/// the hooks.
///
/// ```
/// # use parloop::parallel_for_dynamic;
/// let mut granule_lengths = Vec::new();
/// parallel_for_dynamic(
///     1,
///     2,
///     10,
///     3,
///     |_: &mut usize| {},
///     |_, len| *len += 1,
///     |len| granule_lengths.push(len),
/// )
/// .unwrap();
/// assert_eq!(granule_lengths, [3, 3, 3, 1]);
/// ```
pub fn parallel_for_dynamic<S: Default + Send>(
    step: usize,
    num_workers: usize,
    n: usize,
    granularity: usize,
    before: impl FnMut(&mut S),
    body: impl Fn(usize, &mut S) + Sync,
    after: impl FnMut(S),
) -> Result<(), Error> {
    LoopBuilder {
        num_threads: ThreadCount::try_from(num_workers)?,
        schedule: Schedule::dynamic(granularity)?,
        step,
        cpu_pinning: CpuPinningPolicy::No,
    }
    .run(n, before, body, after)
}

/// Same as [`parallel_for_dynamic()`], with fallible hooks. See
/// [`LoopBuilder::try_run()`] for how errors are reported.
pub fn try_parallel_for_dynamic<S: Default + Send, E: Send>(
    step: usize,
    num_workers: usize,
    n: usize,
    granularity: usize,
    before: impl FnMut(&mut S) -> Result<(), E>,
    body: impl Fn(usize, &mut S) -> Result<(), E> + Sync,
    after: impl FnMut(S) -> Result<(), E>,
) -> Result<(), Error<E>> {
    LoopBuilder {
        num_threads: ThreadCount::try_from(num_workers)?,
        schedule: Schedule::dynamic(granularity)?,
        step,
        cpu_pinning: CpuPinningPolicy::No,
    }
    .try_run(n, before, body, after)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    macro_rules! expand_tests {
        ( $schedule:expr, ) => {};
        ( $schedule:expr, $case:ident, $( $others:tt )* ) => {
            #[test]
            fn $case() {
                $crate::test::$case($schedule);
            }

            expand_tests!($schedule, $($others)*);
        };
        ( $schedule:expr, $case:ident => fail($msg:expr), $( $others:tt )* ) => {
            #[test]
            #[should_panic(expected = $msg)]
            fn $case() {
                $crate::test::$case($schedule);
            }

            expand_tests!($schedule, $($others)*);
        };
    }

    macro_rules! parallelism_tests {
        ( $mod:ident, $schedule:expr, $( $tests:tt )* ) => {
            mod $mod {
                use super::*;

                expand_tests!($schedule, $($tests)*);
            }
        };
    }

    macro_rules! all_parallelism_tests {
        ( $mod:ident, $schedule:expr ) => {
            parallelism_tests!(
                $mod,
                $schedule,
                test_sum_integers,
                test_sum_with_step,
                test_empty_range,
                test_single_worker,
                test_more_workers_than_indices,
                test_visits_each_index_once,
                test_before_precedes_body,
                test_after_never_overlaps,
                test_body_error,
                test_first_of_many_errors,
                test_one_panic => fail("arithmetic panic"),
                test_some_panics => fail("arithmetic panic"),
                test_many_panics => fail("arithmetic panic"),
            );
        };
    }

    all_parallelism_tests!(fixed, Schedule::Static);
    all_parallelism_tests!(dynamic_1, Schedule::dynamic(1).unwrap());
    all_parallelism_tests!(dynamic_7, Schedule::dynamic(7).unwrap());
    all_parallelism_tests!(dynamic_large, Schedule::dynamic(100_000).unwrap());

    fn builder(schedule: Schedule, num_threads: usize, step: usize) -> LoopBuilder {
        LoopBuilder {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            schedule,
            step,
            cpu_pinning: CpuPinningPolicy::No,
        }
    }

    fn sum_below(n: u64) -> u64 {
        n * n.saturating_sub(1) / 2
    }

    fn test_sum_integers(schedule: Schedule) {
        let mut sum = 0;
        builder(schedule, 4, 1)
            .run(
                10_001,
                |_: &mut u64| {},
                |i, partial| *partial += i as u64,
                |partial| sum += partial,
            )
            .unwrap();
        assert_eq!(sum, 5_000 * 10_001);
    }

    fn test_sum_with_step(schedule: Schedule) {
        let mut sum = 0;
        builder(schedule, 3, 3)
            .run(
                1_000,
                |_: &mut u64| {},
                |i, partial| *partial += i as u64,
                |partial| sum += partial,
            )
            .unwrap();
        assert_eq!(sum, (0..1_000).step_by(3).sum::<u64>());
    }

    fn test_empty_range(schedule: Schedule) {
        let num_bodies = AtomicUsize::new(0);
        let mut num_states = 0;
        builder(schedule, 4, 1)
            .run(
                0,
                |_: &mut ()| {},
                |_, _| {
                    num_bodies.fetch_add(1, Ordering::Relaxed);
                },
                |_| num_states += 1,
            )
            .unwrap();
        assert_eq!(num_bodies.into_inner(), 0);
        match schedule {
            // Every worker still gets a state.
            Schedule::Static => assert_eq!(num_states, 4),
            // No granule, hence no state.
            Schedule::Dynamic { .. } => assert_eq!(num_states, 0),
        }
    }

    fn test_single_worker(schedule: Schedule) {
        let mut visited = Vec::new();
        builder(schedule, 1, 1)
            .run(
                100,
                |_: &mut Vec<usize>| {},
                |i, indices| indices.push(i),
                |indices| visited.extend(indices),
            )
            .unwrap();
        // A single worker processes everything in order.
        assert_eq!(visited, (0..100).collect::<Vec<_>>());
    }

    fn test_more_workers_than_indices(schedule: Schedule) {
        let mut num_before = 0;
        let mut states = Vec::new();
        builder(schedule, 5, 1)
            .run(
                2,
                |_: &mut Vec<usize>| num_before += 1,
                |i, indices| indices.push(i),
                |indices| states.push(indices),
            )
            .unwrap();
        match schedule {
            Schedule::Static => {
                assert_eq!(num_before, 5);
                assert_eq!(states, [vec![], vec![], vec![], vec![], vec![0, 1]]);
            }
            Schedule::Dynamic { granularity } => {
                let num_granules = 2usize.div_ceil(granularity.get());
                assert_eq!(num_before, num_granules);
                assert_eq!(states.concat(), [0, 1]);
            }
        }
    }

    fn test_visits_each_index_once(schedule: Schedule) {
        let mut rng = ChaCha12Rng::seed_from_u64(42);
        for _ in 0..20 {
            let n = rng.random_range(0..5_000);
            let num_threads = rng.random_range(1..9);
            let step = rng.random_range(1..6);

            let mut visited = Vec::new();
            builder(schedule, num_threads, step)
                .run(
                    n,
                    |_: &mut Vec<usize>| {},
                    |i, indices| indices.push(i),
                    |indices| visited.extend(indices),
                )
                .unwrap();
            visited.sort_unstable();
            assert_eq!(visited, (0..n).step_by(step).collect::<Vec<_>>());
        }
    }

    /// State that checks it is initialized before use.
    #[derive(Default)]
    struct Checked {
        initialized: bool,
        count: usize,
    }

    fn test_before_precedes_body(schedule: Schedule) {
        let mut total = 0;
        builder(schedule, 4, 1)
            .run(
                1_000,
                |state: &mut Checked| state.initialized = true,
                |_, state| {
                    assert!(state.initialized);
                    state.count += 1;
                },
                |state| {
                    assert!(state.initialized);
                    total += state.count;
                },
            )
            .unwrap();
        assert_eq!(total, 1_000);
    }

    fn test_after_never_overlaps(schedule: Schedule) {
        let log = Mutex::new(Vec::new());
        let next_id = AtomicUsize::new(0);
        builder(schedule, 4, 1)
            .run(
                1_000,
                |id: &mut usize| *id = next_id.fetch_add(1, Ordering::Relaxed),
                |_, _| {},
                |id| {
                    log.lock().unwrap().push(("start", id));
                    std::thread::yield_now();
                    log.lock().unwrap().push(("end", id));
                },
            )
            .unwrap();

        let log = log.into_inner().unwrap();
        assert_eq!(log.len(), 2 * next_id.into_inner());
        for entries in log.chunks(2) {
            assert_eq!(entries[0].0, "start");
            assert_eq!(entries[1], ("end", entries[0].1));
        }
    }

    fn test_body_error(schedule: Schedule) {
        let result = builder(schedule, 4, 1).try_run(
            10_001,
            |_: &mut ()| Ok(()),
            |i, _| if i == 1_234 { Err(i) } else { Ok(()) },
            |_| panic!("after must not run after a failure"),
        );
        assert!(matches!(result, Err(Error::Callback(1_234))));
    }

    fn test_first_of_many_errors(schedule: Schedule) {
        let result = builder(schedule, 4, 1).try_run(
            10_001,
            |_: &mut ()| Ok(()),
            |i, _| if i % 2 == 0 { Err(i) } else { Ok(()) },
            |_| Ok(()),
        );
        match result {
            Err(Error::Callback(i)) => assert_eq!(i % 2, 0),
            _ => panic!("expected a callback error"),
        }
    }

    fn test_one_panic(schedule: Schedule) {
        panicking_sum(schedule, |x| x == 0);
    }

    fn test_some_panics(schedule: Schedule) {
        panicking_sum(schedule, |x| x % 123 == 0);
    }

    fn test_many_panics(schedule: Schedule) {
        panicking_sum(schedule, |x| x % 2 == 0);
    }

    fn panicking_sum(schedule: Schedule, panics_on: impl Fn(u64) -> bool + Sync) {
        let mut sum = 0;
        let _ = builder(schedule, 4, 1).run(
            10_001,
            |_: &mut u64| {},
            |i, partial| {
                let x = i as u64;
                if panics_on(x) {
                    panic!("arithmetic panic");
                } else {
                    *partial += x;
                }
            },
            |partial| sum += partial,
        );
        assert_eq!(sum, sum_below(10_001));
    }

    #[test]
    fn test_static_scenario_two_workers() {
        let mut blocks = Vec::new();
        parallel_for_static(
            1,
            2,
            10,
            |_: &mut Vec<usize>| {},
            |i, indices| indices.push(i),
            |indices| blocks.push(indices),
        )
        .unwrap();
        assert_eq!(blocks, [vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8, 9]]);
    }

    #[test]
    fn test_dynamic_scenario_clamped_granule() {
        let num_bodies = AtomicUsize::new(0);
        let mut granules = Vec::new();
        parallel_for_dynamic(
            1,
            2,
            10,
            3,
            |_: &mut Vec<usize>| {},
            |i, indices| {
                num_bodies.fetch_add(1, Ordering::Relaxed);
                indices.push(i);
            },
            |indices| granules.push(indices),
        )
        .unwrap();
        assert_eq!(num_bodies.into_inner(), 10);
        let starts = granules.iter().map(|g| g[0]).collect::<Vec<_>>();
        assert_eq!(starts, [0, 3, 6, 9]);
        assert_eq!(granules[3], [9]);
    }

    #[test]
    fn test_invalid_configurations() {
        let result = parallel_for_static(1, 0, 10, |_: &mut ()| {}, |_, _| {}, |_| {});
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroWorkers))));

        let result = parallel_for_dynamic(1, 4, 10, 0, |_: &mut ()| {}, |_, _| {}, |_| {});
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ZeroGranularity))
        ));

        let result = try_parallel_for_static::<(), ()>(
            0,
            4,
            10,
            |_| panic!("before must not run"),
            |_, _| Ok(()),
            |_| Ok(()),
        );
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroStep))));

        let result = try_parallel_for_dynamic::<(), ()>(
            1,
            0,
            10,
            2,
            |_| panic!("before must not run"),
            |_, _| Ok(()),
            |_| Ok(()),
        );
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroWorkers))));
    }

    #[test]
    fn test_schedules_agree_with_sequential() {
        let mut expected = Vec::new();
        sequential_for(0, 777, 4, |i| expected.push(i)).unwrap();

        let mut visited = Vec::new();
        parallel_for_static(
            4,
            3,
            777,
            |_: &mut Vec<usize>| {},
            |i, indices| indices.push(i),
            |indices| visited.extend(indices),
        )
        .unwrap();
        // Static blocks are finalized in worker order, hence sorted.
        assert_eq!(visited, expected);

        let mut visited = Vec::new();
        parallel_for_dynamic(
            4,
            3,
            777,
            10,
            |_: &mut Vec<usize>| {},
            |i, indices| indices.push(i),
            |indices| visited.extend(indices),
        )
        .unwrap();
        // So are granules.
        assert_eq!(visited, expected);
    }
}
