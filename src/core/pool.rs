// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A pool of worker threads scoped to a single loop.

use super::sync::{Failures, MainStatus, Status};
use crate::config::CpuPinningPolicy;
use crate::error::Error;
use crate::macros::{log_debug, log_error, log_warn};
use crossbeam_utils::CachePadded;
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether worker threads can be pinned to CPUs on this platform.
pub const PINNING_SUPPORTED: bool = cfg!(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
));

/// A pool of worker threads. Threads are spawned by each call to
/// [`execute()`](Self::execute) and joined before it returns.
pub struct WorkerPool {
    /// Number of worker threads.
    num_threads: NonZeroUsize,
    /// Policy to pin worker threads to CPUs.
    cpu_pinning: CpuPinningPolicy,
}

impl WorkerPool {
    /// Creates a pool of the given number of worker threads.
    pub fn new(num_threads: NonZeroUsize, cpu_pinning: CpuPinningPolicy) -> Self {
        Self {
            num_threads,
            cpu_pinning,
        }
    }

    /// Returns the number of worker threads in this pool.
    pub fn num_threads(&self) -> usize {
        self.num_threads.get()
    }

    /// Spawns one worker thread per task, runs `work(worker_id, task,
    /// failures)` on each of them, and joins them all.
    ///
    /// Workers are expected to poll [`Failures::should_stop()`] between two
    /// units of work. The first error returned by `work` is returned once
    /// every thread has been joined. If a worker panicked, the panic of the
    /// first one is resumed on the calling thread instead.
    pub fn execute<T: Send, E: Send>(
        &self,
        tasks: Vec<T>,
        work: impl Fn(usize, T, &Failures<E>) -> Result<(), E> + Sync,
    ) -> Result<(), Error<E>> {
        let num_tasks = tasks.len();
        let shared = SharedContext {
            num_active_threads: CachePadded::new(AtomicUsize::new(num_tasks)),
            main_status: Status::new(if num_tasks == 0 {
                MainStatus::Ready
            } else {
                MainStatus::Waiting
            }),
            failures: Failures::new(),
        };
        let cpu_pinning = self.cpu_pinning;

        let (spawn_error, panic_payload) = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(num_tasks);
            let mut spawn_error = None;
            for (id, task) in tasks.into_iter().enumerate() {
                let shared = &shared;
                let work = &work;
                let spawned = std::thread::Builder::new()
                    .name(format!("parloop-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        let _notifier = Notifier { id, shared };
                        pin_current_thread(id, cpu_pinning);
                        log_debug!("[thread {id}] Started");
                        if let Err(e) = work(id, task, &shared.failures) {
                            log_debug!("[thread {id}] A hook returned an error");
                            shared.failures.record_error(id, e);
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        log_error!("[main thread] Failed to spawn thread #{id}: {e}");
                        shared.failures.stop();
                        shared.release_unspawned(num_tasks - id);
                        spawn_error = Some(Error::Spawn {
                            worker: id,
                            source: e,
                        });
                        break;
                    }
                }
            }
            log_debug!("[main thread] Spawned {} threads", handles.len());

            drop(
                shared
                    .main_status
                    .wait_while(|status| *status == MainStatus::Waiting),
            );
            log_debug!("[main thread] All threads have now finished.");

            let first_panic = shared.failures.first_panic();
            let mut panic_payload: Option<Box<dyn Any + Send>> = None;
            for (i, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(()) => log_debug!("[main thread] Thread {i} joined"),
                    Err(payload) => {
                        if first_panic == Some(i) {
                            log_error!("[main thread] Thread {i} joined after panicking");
                            panic_payload = Some(payload);
                        } else {
                            log_error!(
                                "[main thread] Thread {i} joined after panicking, discarding its panic"
                            );
                        }
                    }
                }
            }
            log_debug!("[main thread] Joined threads.");
            (spawn_error, panic_payload)
        });

        if let Some(payload) = panic_payload {
            log_error!("[main thread] A worker thread panicked!");
            std::panic::resume_unwind(payload);
        }
        if let Some(error) = spawn_error {
            return Err(error);
        }
        match shared.failures.into_first_error() {
            Some(error) => Err(Error::Callback(error)),
            None => Ok(()),
        }
    }
}

/// Context shared between the main thread and the worker threads.
struct SharedContext<E> {
    /// Number of worker threads that haven't finished yet.
    num_active_threads: CachePadded<AtomicUsize>,
    /// Status of the main thread.
    main_status: Status<MainStatus>,
    /// Failures observed by the worker threads.
    failures: Failures<E>,
}

impl<E> SharedContext<E> {
    /// Marks the given number of threads as finished, waking up the main
    /// thread if no thread remains active.
    fn release(&self, count: usize) -> usize {
        let thread_count = self.num_active_threads.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(thread_count >= count);
        if thread_count == count {
            self.main_status.notify_one(MainStatus::Ready);
        }
        thread_count - count
    }

    /// Releases the threads that were accounted for but never spawned.
    fn release_unspawned(&self, count: usize) {
        let _remaining = self.release(count);
        log_debug!("[main thread] Released {count} unspawned threads, {_remaining} remaining");
    }
}

/// Object whose destructor notifies the main thread that a worker thread has
/// finished (or has panicked).
struct Notifier<'a, E> {
    /// Thread index.
    id: usize,
    /// Context shared between the main thread and the worker threads.
    shared: &'a SharedContext<E>,
}

impl<E> Drop for Notifier<'_, E> {
    fn drop(&mut self) {
        let id = self.id;
        if std::thread::panicking() {
            log_error!("[thread {id}] Detected panic in this thread, notifying the main thread");
            self.shared.failures.record_panic(id);
        }

        let _remaining = self.shared.release(1);
        if _remaining == 0 {
            log_debug!("[thread {id}] We're the last thread. Woke up the main thread.");
        } else {
            log_debug!("[thread {id}] Finished, {_remaining} threads remaining.");
        }
    }
}

/// Pins the current thread to the CPU of the same index, according to the
/// given policy.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn pin_current_thread(id: usize, cpu_pinning: CpuPinningPolicy) {
    match cpu_pinning {
        CpuPinningPolicy::No => (),
        CpuPinningPolicy::IfSupported => {
            let mut cpu_set = CpuSet::new();
            if let Err(_e) = cpu_set.set(id) {
                log_warn!("Failed to set CPU affinity for thread #{id}: {_e}");
            } else if let Err(_e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                log_warn!("Failed to set CPU affinity for thread #{id}: {_e}");
            } else {
                log_debug!("Pinned thread #{id} to CPU #{id}");
            }
        }
        CpuPinningPolicy::Always => {
            let mut cpu_set = CpuSet::new();
            if let Err(e) = cpu_set.set(id) {
                panic!("Failed to set CPU affinity for thread #{id}: {e}");
            } else if let Err(e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                panic!("Failed to set CPU affinity for thread #{id}: {e}");
            } else {
                log_debug!("Pinned thread #{id} to CPU #{id}");
            }
        }
    }
}

#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
fn pin_current_thread(id: usize, cpu_pinning: CpuPinningPolicy) {
    match cpu_pinning {
        CpuPinningPolicy::No => (),
        CpuPinningPolicy::IfSupported => {
            log_warn!("Pinning thread #{id} to a CPU is not implemented on this platform.")
        }
        CpuPinningPolicy::Always => {
            panic!("Pinning threads to CPUs is not implemented on this platform.")
        }
    }
}
