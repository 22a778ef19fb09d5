// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Storage for one state object per granule, indexed by granule id.
///
/// States aren't tied to any worker: whichever worker claims a granule checks
/// out the matching slot for the duration of the granule. Because the
/// [`GranuleTable`](super::range::GranuleTable) hands out each granule id at
/// most once, slots are never contended and the locks only transfer ownership.
pub struct GranuleArena<S> {
    slots: Box<[Mutex<S>]>,
}

impl<S: Default> GranuleArena<S> {
    /// Creates an arena of `num_granules` default states, calling `init` on
    /// each of them in granule order. Stops at the first error.
    pub fn new<E>(
        num_granules: usize,
        mut init: impl FnMut(&mut S) -> Result<(), E>,
    ) -> Result<Self, E> {
        let slots = (0..num_granules)
            .map(|_| {
                let mut state = S::default();
                init(&mut state)?;
                Ok(Mutex::new(state))
            })
            .collect::<Result<Box<[_]>, E>>()?;
        Ok(Self { slots })
    }
}

impl<S> GranuleArena<S> {
    /// Returns the number of slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Checks out the state of the given granule.
    pub fn checkout(&self, granule_id: usize) -> MutexGuard<'_, S> {
        // A slot is poisoned only if the worker holding it panicked, in which
        // case the loop resumes that panic before anyone reads the states.
        self.slots[granule_id]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes the arena, returning the states in granule order.
    pub fn into_states(self) -> impl Iterator<Item = S> {
        self.slots
            .into_vec()
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
