// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Synchronization primitives

use crate::macros::log_warn;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
pub struct Status<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Status<T> {
    /// Creates a new status initialized with the given value.
    pub fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    /// Sets the status to the given value and notifies one waiting thread.
    ///
    /// The status is a plain value that no critical section leaves in an
    /// inconsistent state, so a poisoned [`Mutex`] is recovered.
    pub fn notify_one(&self, t: T) {
        *self.lock() = t;
        self.condvar.notify_one();
    }

    /// Waits until the predicate is false on this status.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify the
    /// status.
    pub fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<'_, T> {
        self.condvar
            .wait_while(self.lock(), predicate)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Status of the main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainStatus {
    /// The main thread is waiting for the worker threads to finish.
    Waiting,
    /// All the worker threads have finished, the main thread can join them.
    Ready,
}

/// Failures observed by the workers of a loop.
///
/// Only the first failure is kept. Recording any failure raises a stop flag
/// that workers poll between two indices.
pub struct Failures<E> {
    /// Whether workers should stop processing indices.
    stop: CachePadded<AtomicBool>,
    /// First error returned by a hook, with the index of the worker that
    /// returned it.
    first_error: Mutex<Option<(usize, E)>>,
    /// Index of the first worker that panicked, or `usize::MAX` if none did.
    first_panic: AtomicUsize,
}

impl<E> Failures<E> {
    /// Creates an empty set of failures.
    pub fn new() -> Self {
        Self {
            stop: CachePadded::new(AtomicBool::new(false)),
            first_error: Mutex::new(None),
            first_panic: AtomicUsize::new(usize::MAX),
        }
    }

    /// Returns whether workers should stop processing indices.
    #[inline(always)]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Asks all workers to stop without recording a failure of their own.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Records an error returned by a hook on the given worker. Only the first
    /// error is kept, subsequent ones are dropped.
    pub fn record_error(&self, worker_id: usize, error: E) {
        self.stop();
        let mut first_error = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match first_error.as_ref().map(|(id, _)| *id) {
            None => *first_error = Some((worker_id, error)),
            Some(_first_id) => log_warn!(
                "[thread {worker_id}] Discarding error, worker #{_first_id} failed first"
            ),
        }
    }

    /// Records that the given worker is panicking.
    pub fn record_panic(&self, worker_id: usize) {
        self.stop();
        // Only the first store succeeds.
        let _ = self.first_panic.compare_exchange(
            usize::MAX,
            worker_id,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Returns the index of the first worker that panicked, if any.
    pub fn first_panic(&self) -> Option<usize> {
        match self.first_panic.load(Ordering::SeqCst) {
            usize::MAX => None,
            id => Some(id),
        }
    }

    /// Takes the first error recorded, if any.
    pub fn into_first_error(self) -> Option<E> {
        self.first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(_, error)| error)
    }
}
