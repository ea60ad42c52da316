// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Serial and parallel AXPY kernels (`Y += a * X`).

use crate::error::{Error, Result};
use crate::macros::log_debug;
use crate::parallel_for::{CpuPinningPolicy, ParallelFor, ThreadCount};
use crate::partition::RangeStrategy;
use num_traits::Float;

/// Floating-point element type supported by the kernels.
///
/// This is implemented for every [`Float`] type that can be shared across
/// threads, in particular [`f32`] and [`f64`].
pub trait Real: Float + Send + Sync + 'static {}

impl<T: Float + Send + Sync + 'static> Real for T {}

/// Computes `y[i] = y[i] + a * x[i]` for every index, in a single pass.
///
/// The multiplication and the addition are rounded separately, i.e. no fused
/// multiply-add is used.
///
/// # Panics
///
/// Panics if `y` and `x` have different lengths.
pub fn axpy<T: Real>(y: &mut [T], x: &[T], a: T) {
    assert_eq!(
        y.len(),
        x.len(),
        "called axpy() with vectors of different lengths"
    );
    axpy_chunk(y, x, a);
}

#[inline(always)]
fn axpy_chunk<T: Real>(y: &mut [T], x: &[T], a: T) {
    for (y, &x) in y.iter_mut().zip(x) {
        *y = *y + a * x;
    }
}

/// An implementation of the AXPY operation.
pub trait Kernel<T: Real> {
    /// Short human-readable name, used in benchmark reports.
    fn name(&self) -> String;

    /// Updates `y` in place with `y[i] + a * x[i]`.
    ///
    /// Fails with [`Error::LengthMismatch`] if `y` and `x` have different
    /// lengths, in which case `y` is left untouched.
    fn apply(&self, y: &mut [T], x: &[T], a: T) -> Result<()>;
}

/// Single-threaded kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerialKernel;

impl<T: Real> Kernel<T> for SerialKernel {
    fn name(&self) -> String {
        "serial".to_owned()
    }

    fn apply(&self, y: &mut [T], x: &[T], a: T) -> Result<()> {
        if y.len() != x.len() {
            return Err(Error::LengthMismatch {
                outputs: y.len(),
                inputs: x.len(),
            });
        }
        axpy_chunk(y, x, a);
        Ok(())
    }
}

/// Multi-threaded kernel, splitting the vectors into one contiguous chunk per
/// worker thread.
///
/// Each invocation spawns its own worker threads and joins them before
/// returning, so the result is identical to [`SerialKernel`]: every element
/// goes through the same two floating-point operations, only on a different
/// thread.
///
/// ```
/// # use paraxpy::{Kernel, ParallelKernel};
/// let kernel = ParallelKernel::new(2).unwrap();
/// let x = [1.0f32, 2.0, 3.0, 4.0];
/// let mut y = [0.0f32; 4];
/// kernel.apply(&mut y, &x, 2.0).unwrap();
/// assert_eq!(y, [2.0, 4.0, 6.0, 8.0]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelKernel {
    parallel_for: ParallelFor,
}

impl ParallelKernel {
    /// Creates a kernel with the given number of worker threads, using the
    /// [`RangeStrategy::RemainderLast`] partitioning.
    ///
    /// Fails with [`Error::InvalidArgument`] if `num_threads` is zero.
    pub fn new(num_threads: usize) -> Result<Self> {
        Ok(Self::with_config(ParallelFor {
            num_threads: ThreadCount::try_from(num_threads)?,
            range_strategy: RangeStrategy::RemainderLast,
            cpu_pinning: CpuPinningPolicy::No,
        }))
    }

    /// Creates a kernel running on the given parallel-for configuration.
    pub fn with_config(parallel_for: ParallelFor) -> Self {
        Self { parallel_for }
    }

    /// Returns the configuration of this kernel.
    pub fn config(&self) -> &ParallelFor {
        &self.parallel_for
    }
}

impl<T: Real> Kernel<T> for ParallelKernel {
    fn name(&self) -> String {
        match self.parallel_for.num_threads {
            ThreadCount::Count(count) => format!("{count} threads"),
            ThreadCount::AvailableParallelism => "all threads".to_owned(),
        }
    }

    fn apply(&self, y: &mut [T], x: &[T], a: T) -> Result<()> {
        log_debug!(
            "Running parallel axpy on {} elements with {:?}",
            y.len(),
            self.parallel_for
        );
        self.parallel_for.for_each_task(y, x, |task| {
            let (y, x) = task.into_parts();
            axpy_chunk(y, x, a);
        })
    }
}
