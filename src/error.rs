// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types.

use std::convert::Infallible;

/// Invalid loop configuration, reported before any hook runs and before any
/// thread is spawned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The number of worker threads is zero.
    #[error("the number of worker threads must be greater than zero")]
    ZeroWorkers,
    /// The granule size of a dynamic schedule is zero.
    #[error("the granularity must be greater than zero")]
    ZeroGranularity,
    /// The step between two visited indices is zero.
    #[error("the step must be greater than zero")]
    ZeroStep,
    /// [`CpuPinningPolicy::Always`](crate::CpuPinningPolicy::Always) was
    /// requested on a platform where pinning isn't implemented.
    #[error("pinning threads to CPUs is not implemented on this platform")]
    PinningUnsupported,
    /// Querying the available parallelism failed.
    #[error("getting the available parallelism failed: {0}")]
    AvailableParallelism(#[source] std::io::Error),
}

/// Error returned by a parallel loop.
///
/// The type parameter is the error type of the caller's hooks. Infallible
/// loops (such as [`parallel_for_static()`](crate::parallel_for_static)) use
/// the default [`Infallible`], in which case only the configuration and
/// spawning variants can occur.
#[derive(Debug, thiserror::Error)]
pub enum Error<E = Infallible> {
    /// The loop configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread #{worker}: {source}")]
    Spawn {
        /// Index of the worker that couldn't be spawned.
        worker: usize,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A hook returned an error. Only the first error observed is reported.
    #[error("a loop hook failed: {0}")]
    Callback(E),
}

impl Error<Infallible> {
    /// Converts this error into one with an arbitrary callback error type.
    ///
    /// This is always possible because an [`Infallible`] callback error can't
    /// be constructed.
    pub fn widen<E>(self) -> Error<E> {
        match self {
            Error::Config(e) => Error::Config(e),
            Error::Spawn { worker, source } => Error::Spawn { worker, source },
            Error::Callback(never) => match never {},
        }
    }
}

impl<E> Error<E> {
    /// Returns the hook's error, if this error was raised by a hook.
    pub fn into_callback(self) -> Option<E> {
        match self {
            Error::Callback(e) => Some(e),
            _ => None,
        }
    }
}
