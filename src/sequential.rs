// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Sequential reference loops, running on the calling thread.

use crate::core::stepped;
use crate::error::{ConfigError, Error};

/// Calls `f` on the indices `begin, begin + step, ...` below `end`, in
/// increasing order on the calling thread.
///
/// This is the baseline that the parallel loops are checked against.
///
/// ```
/// # use parloop::sequential_for;
/// let mut visited = Vec::new();
/// sequential_for(3, 12, 4, |i| visited.push(i)).unwrap();
/// assert_eq!(visited, [3, 7, 11]);
/// ```
pub fn sequential_for(
    begin: usize,
    end: usize,
    step: usize,
    mut f: impl FnMut(usize),
) -> Result<(), Error> {
    try_sequential_for(begin, end, step, |i| {
        f(i);
        Ok(())
    })
}

/// Same as [`sequential_for()`], with a fallible callback. The first error
/// stops the loop and is returned.
pub fn try_sequential_for<E>(
    begin: usize,
    end: usize,
    step: usize,
    mut f: impl FnMut(usize) -> Result<(), E>,
) -> Result<(), Error<E>> {
    if step == 0 {
        return Err(ConfigError::ZeroStep.into());
    }
    // Shifting by `begin` keeps the indices congruent to `begin` rather than to
    // zero.
    let len = end.saturating_sub(begin);
    for offset in stepped(0..len, step) {
        f(begin + offset).map_err(Error::Callback)?;
    }
    Ok(())
}
