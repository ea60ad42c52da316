// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A scoped parallel-for over a pair of slices, with one worker thread per
//! statically computed chunk.

use crate::error::{Error, Result};
#[cfg(feature = "log_parallelism")]
use crate::macros::log_info;
use crate::macros::{log_debug, log_error, log_warn};
use crate::partition::{partitions_for_slice, RangeStrategy};
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
use std::num::NonZeroUsize;
use std::ops::Range;
use std::thread::{Builder, Scope, ScopedJoinHandle};
#[cfg(feature = "log_parallelism")]
use std::time::Instant;

/// Number of worker threads to spawn for each invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl ThreadCount {
    /// Resolves the number of threads to spawn.
    pub fn count(self) -> Result<NonZeroUsize> {
        match self {
            ThreadCount::AvailableParallelism => {
                std::thread::available_parallelism().map_err(Error::AvailableParallelism)
            }
            ThreadCount::Count(count) => Ok(count),
        }
    }
}

impl TryFrom<usize> for ThreadCount {
    type Error = Error;

    fn try_from(thread_count: usize) -> Result<Self> {
        let count = NonZeroUsize::try_from(thread_count).map_err(|_| {
            Error::InvalidArgument("the number of threads must be positive".to_owned())
        })?;
        Ok(ThreadCount::Count(count))
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    #[default]
    No,
    /// Pin worker thread `i` to CPU `i`, if CPU pinning is supported and
    /// implemented on this platform. Failures are logged and otherwise
    /// ignored.
    IfSupported,
    /// Pin worker thread `i` to CPU `i`. Any failure, including an unsupported
    /// platform, fails the invocation with [`Error::CpuPinning`].
    Always,
}

/// The unit of work handed to one worker thread: a contiguous range of
/// indices, together with the matching disjoint chunks of the output and input
/// slices.
///
/// Tasks are built by [`ParallelFor`] and moved into their worker thread.
#[derive(Debug)]
pub struct Task<'a, T, U> {
    worker_id: usize,
    range: Range<usize>,
    outputs: &'a mut [T],
    inputs: &'a [U],
}

impl<'a, T, U> Task<'a, T, U> {
    /// Index of the worker thread that owns this task.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Range of indices covered by this task, relative to the full slices.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Number of items in this task.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether this task covers no items at all.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Applies the given operation to each pair of items of this task.
    pub fn for_each(self, op: impl Fn(&mut T, &U)) {
        self.outputs
            .iter_mut()
            .zip(self.inputs)
            .for_each(|(out, input)| op(out, input));
    }

    /// Returns the output and input chunks of this task.
    pub fn into_parts(self) -> (&'a mut [T], &'a [U]) {
        (self.outputs, self.inputs)
    }
}

/// Runs an operation over a pair of slices on freshly spawned scoped threads,
/// one per chunk.
///
/// There is no persistent thread pool: every call spawns its worker threads and
/// joins all of them before returning, on every path (including errors and
/// panics in the workers). The output slice is split into disjoint mutable
/// chunks, so workers never need to synchronize with each other.
///
/// ```
/// # use paraxpy::{CpuPinningPolicy, ParallelFor, RangeStrategy, ThreadCount};
/// let parallel_for = ParallelFor {
///     num_threads: ThreadCount::try_from(4).unwrap(),
///     range_strategy: RangeStrategy::RemainderLast,
///     cpu_pinning: CpuPinningPolicy::No,
/// };
///
/// let mut output = vec![0; 10];
/// let input = (0..10).collect::<Vec<u64>>();
/// parallel_for
///     .zip_for_each(&mut output, &input, |out, x| *out = x * x)
///     .unwrap();
/// assert_eq!(output, [0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelFor {
    /// Number of worker threads to spawn.
    pub num_threads: ThreadCount,
    /// Strategy to split the indices among threads.
    pub range_strategy: RangeStrategy,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl ParallelFor {
    /// Creates a parallel-for with the given number of threads, the default
    /// [`RangeStrategy`] and no CPU pinning.
    pub fn new(num_threads: NonZeroUsize) -> Self {
        Self {
            num_threads: ThreadCount::Count(num_threads),
            range_strategy: RangeStrategy::default(),
            cpu_pinning: CpuPinningPolicy::default(),
        }
    }

    /// Applies `op` to each pair `(&mut outputs[i], &inputs[i])` in parallel,
    /// returning once all the worker threads have finished.
    pub fn zip_for_each<T: Send, U: Sync>(
        &self,
        outputs: &mut [T],
        inputs: &[U],
        op: impl Fn(&mut T, &U) + Sync,
    ) -> Result<()> {
        self.for_each_task(outputs, inputs, |task| task.for_each(&op))
    }

    /// Splits the slices into one [`Task`] per worker thread, and runs `f` on
    /// each task in its own thread, returning once all the worker threads
    /// have finished.
    ///
    /// Fails if the slices have different lengths, if a worker thread cannot
    /// be spawned or pinned, or if any worker panics. In the failure cases
    /// after spawning, the outputs may have been partially updated.
    pub fn for_each_task<T: Send, U: Sync>(
        &self,
        outputs: &mut [T],
        inputs: &[U],
        f: impl Fn(Task<'_, T, U>) + Sync,
    ) -> Result<()> {
        if outputs.len() != inputs.len() {
            return Err(Error::LengthMismatch {
                outputs: outputs.len(),
                inputs: inputs.len(),
            });
        }
        let num_threads = self.num_threads.count()?;
        check_cpu_pinning_support(self.cpu_pinning)?;

        let ranges = partitions_for_slice(outputs, num_threads, self.range_strategy);
        let tasks = split_tasks(outputs, inputs, ranges);

        std::thread::scope(|scope| self.spawn_and_join(scope, tasks, &f, worker_builder))
    }

    /// Spawns one worker thread per task, each configured by `builder`, then
    /// joins all of them.
    ///
    /// If a spawn fails, no further thread is spawned, and the threads spawned
    /// so far are joined before returning the error.
    fn spawn_and_join<'scope, 'env, T: Send, U: Sync, F: Fn(Task<'env, T, U>) + Sync>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        tasks: Vec<Task<'env, T, U>>,
        f: &'scope F,
        builder: impl Fn(usize) -> Builder,
    ) -> Result<()> {
        let mut handles: Vec<ScopedJoinHandle<'scope, Result<()>>> =
            Vec::with_capacity(tasks.len());
        let mut spawn_error = None;

        for task in tasks {
            let worker_id = task.worker_id;
            let cpu_pinning = self.cpu_pinning;
            let spawned = builder(worker_id).spawn_scoped(scope, move || -> Result<()> {
                pin_current_thread(worker_id, cpu_pinning)?;
                run_task(task, f);
                Ok(())
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    log_error!("[main thread] Failed to spawn thread #{worker_id}: {source}");
                    spawn_error = Some(Error::Spawn {
                        worker: worker_id,
                        source,
                    });
                    break;
                }
            }
        }
        log_debug!("[main thread] Spawned {} threads", handles.len());

        let mut num_panics = 0;
        let mut worker_error = None;
        for (_i, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => log_debug!("[main thread] Thread #{_i} finished"),
                Ok(Err(e)) => {
                    log_error!("[main thread] Thread #{_i} failed: {e}");
                    worker_error.get_or_insert(e);
                }
                Err(_) => {
                    log_error!("[main thread] Thread #{_i} panicked");
                    num_panics += 1;
                }
            }
        }
        log_debug!("[main thread] Joined threads.");

        if let Some(e) = spawn_error {
            return Err(e);
        }
        if num_panics != 0 {
            return Err(Error::WorkerPanicked { count: num_panics });
        }
        match worker_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Thread builder for the given worker.
fn worker_builder(worker_id: usize) -> Builder {
    Builder::new().name(format!("axpy-worker-{worker_id}"))
}

/// Splits the slices along the given contiguous ranges.
fn split_tasks<'a, T, U>(
    mut outputs: &'a mut [T],
    mut inputs: &'a [U],
    ranges: impl Iterator<Item = Range<usize>>,
) -> Vec<Task<'a, T, U>> {
    let mut start = 0;
    ranges
        .enumerate()
        .map(|(worker_id, range)| {
            debug_assert_eq!(range.start, start);
            start = range.end;
            let (out_chunk, out_rest) = std::mem::take(&mut outputs).split_at_mut(range.len());
            let (in_chunk, in_rest) = inputs.split_at(range.len());
            outputs = out_rest;
            inputs = in_rest;
            Task {
                worker_id,
                range,
                outputs: out_chunk,
                inputs: in_chunk,
            }
        })
        .collect()
}

/// Main function run by a worker thread.
fn run_task<'a, T, U>(task: Task<'a, T, U>, f: &impl Fn(Task<'a, T, U>)) {
    #[cfg(feature = "log_parallelism")]
    let (worker_id, len, start) = (task.worker_id, task.len(), Instant::now());

    f(task);

    #[cfg(feature = "log_parallelism")]
    log_info!(
        "[thread {worker_id}] Processed {len} items in {:?}",
        start.elapsed()
    );
}

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn check_cpu_pinning_support(_cpu_pinning: CpuPinningPolicy) -> Result<()> {
    Ok(())
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
fn check_cpu_pinning_support(cpu_pinning: CpuPinningPolicy) -> Result<()> {
    match cpu_pinning {
        CpuPinningPolicy::No => Ok(()),
        CpuPinningPolicy::IfSupported => {
            log_warn!("Pinning threads to CPUs is not implemented on this platform.");
            Ok(())
        }
        CpuPinningPolicy::Always => Err(Error::CpuPinning {
            worker: 0,
            reason: "not implemented on this platform".to_owned(),
        }),
    }
}

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn pin_current_thread(id: usize, cpu_pinning: CpuPinningPolicy) -> Result<()> {
    let set_affinity = || -> nix::Result<()> {
        let mut cpu_set = CpuSet::new();
        cpu_set.set(id)?;
        sched_setaffinity(Pid::from_raw(0), &cpu_set)
    };
    match cpu_pinning {
        CpuPinningPolicy::No => Ok(()),
        CpuPinningPolicy::IfSupported => {
            match set_affinity() {
                Ok(()) => log_debug!("Pinned thread #{id} to CPU #{id}"),
                Err(_e) => log_warn!("Failed to set CPU affinity for thread #{id}: {_e}"),
            }
            Ok(())
        }
        CpuPinningPolicy::Always => {
            set_affinity().map_err(|e| Error::CpuPinning {
                worker: id,
                reason: e.to_string(),
            })?;
            log_debug!("Pinned thread #{id} to CPU #{id}");
            Ok(())
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
fn pin_current_thread(_id: usize, _cpu_pinning: CpuPinningPolicy) -> Result<()> {
    // Unsupported policies were already rejected by `check_cpu_pinning_support()`.
    Ok(())
}
