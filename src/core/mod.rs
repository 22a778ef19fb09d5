// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core engine: worker pool, partitioning, scheduling and synchronization
//! primitives.

mod arena;
mod pool;
mod range;
mod schedule;
mod sync;

pub(crate) use pool::{WorkerPool, PINNING_SUPPORTED};
pub(crate) use range::stepped;
pub(crate) use schedule::{run_dynamic, run_static};
