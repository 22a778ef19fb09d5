// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Internal logging macros.
//!
//! With the `log` feature, `log_debug!`, `log_warn!` and `log_error!` forward
//! to the [`log`](https://docs.rs/log) facade. The `log_parallelism` feature
//! additionally enables `log_info!` and `log_trace!`, which are used on hot
//! paths (granule claims, per-worker statistics).
//!
//! Without the corresponding feature, a macro expands to a no-op that still
//! type-checks its format arguments, so that variables used only for logging
//! don't trigger warnings.

#[cfg(feature = "log")]
macro_rules! log_debug {
    ( $($args:tt)* ) => {
        log::debug!( $($args)* )
    };
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ( $($args:tt)* ) => {
        log::warn!( $($args)* )
    };
}

#[cfg(feature = "log")]
macro_rules! log_error {
    ( $($args:tt)* ) => {
        log::error!( $($args)* )
    };
}

#[cfg(feature = "log_parallelism")]
macro_rules! log_info {
    ( $($args:tt)* ) => {
        log::info!( $($args)* )
    };
}

#[cfg(feature = "log_parallelism")]
macro_rules! log_trace {
    ( $($args:tt)* ) => {
        log::trace!( $($args)* )
    };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ( $($args:tt)* ) => {{
        let _ = format_args!( $($args)* );
    }};
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ( $($args:tt)* ) => {{
        let _ = format_args!( $($args)* );
    }};
}

#[cfg(not(feature = "log"))]
macro_rules! log_error {
    ( $($args:tt)* ) => {{
        let _ = format_args!( $($args)* );
    }};
}

#[cfg(not(feature = "log_parallelism"))]
macro_rules! log_info {
    ( $($args:tt)* ) => {{
        let _ = format_args!( $($args)* );
    }};
}

#[cfg(not(feature = "log_parallelism"))]
macro_rules! log_trace {
    ( $($args:tt)* ) => {{
        let _ = format_args!( $($args)* );
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_trace;
pub(crate) use log_warn;
