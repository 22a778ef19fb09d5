// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to run example loops in parallel.

use clap::{Parser, ValueEnum};
use parloop::{CpuPinningPolicy, LoopBuilder, Schedule, ThreadCount};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::hint::black_box;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let builder = LoopBuilder {
        num_threads: match cli.num_threads {
            Some(num_threads) => ThreadCount::Count(num_threads),
            None => ThreadCount::AvailableParallelism,
        },
        schedule: match cli.schedule {
            ScheduleCli::Static => Schedule::Static,
            ScheduleCli::Dynamic => Schedule::Dynamic {
                granularity: cli.granularity,
            },
        },
        step: cli.step.get(),
        cpu_pinning: if cli.pin_threads {
            CpuPinningPolicy::IfSupported
        } else {
            CpuPinningPolicy::No
        },
    };

    let start = Instant::now();
    let result = match cli.scenario {
        Scenario::Sum => builder.run(
            cli.input_size,
            |_: &mut u64| {},
            |i, partial| *partial += i as u64,
            |partial| println!("partial sum = {partial}"),
        ),
        Scenario::Skewed => {
            let costs = skewed_costs(cli.input_size);
            builder.run(
                cli.input_size,
                |_: &mut u64| {},
                |i, partial| *partial = partial.wrapping_add(spin(costs[i])),
                |partial| {
                    black_box(partial);
                },
            )
        }
    };
    let elapsed = start.elapsed();

    match result {
        Ok(()) => {
            println!("finished in {elapsed:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Draws the cost of each iteration of the skewed scenario: most iterations
/// are cheap, a few are expensive. The costs are fixed by a constant seed for
/// reproducibility.
fn skewed_costs(input_size: usize) -> Vec<u32> {
    let mut rng = ChaCha12Rng::seed_from_u64(42);
    (0..input_size)
        .map(|_| {
            if rng.random_ratio(1, 100) {
                rng.random_range(1_000..10_000)
            } else {
                rng.random_range(1..10)
            }
        })
        .collect()
}

/// Busy work proportional to the given cost.
fn spin(cost: u32) -> u64 {
    (0..cost as u64).fold(0, |acc, x| black_box(acc ^ x))
}

/// CLI tool to run example loops in parallel.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
struct Cli {
    /// Number of worker threads. Default to the available parallelism.
    #[arg(long)]
    num_threads: Option<NonZeroUsize>,

    /// Policy to split indices among threads.
    #[arg(long, value_enum)]
    schedule: ScheduleCli,

    /// Number of indices per granule. Used only for the dynamic schedule.
    #[arg(long, default_value = "1024")]
    granularity: NonZeroUsize,

    /// Distance between two visited indices.
    #[arg(long, default_value = "1")]
    step: NonZeroUsize,

    /// Scenario to run in parallel.
    #[arg(long, value_enum)]
    scenario: Scenario,

    /// Number of indices to iterate over.
    #[arg(long, default_value_t = 1_000_000)]
    input_size: usize,

    /// Whether to pin worker threads to CPUs.
    #[arg(long, default_value_t = false)]
    pin_threads: bool,
}

/// Policy to split indices among threads.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum ScheduleCli {
    /// Each worker thread processes a fixed contiguous block of indices.
    Static,
    /// Worker threads claim granules of indices until none remain.
    Dynamic,
}

/// Scenario to run.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum Scenario {
    /// Sum the indices, where every iteration has the same cost.
    Sum,
    /// Run iterations of very uneven costs.
    Skewed,
}
