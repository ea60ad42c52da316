// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error type shared by the kernels, the parallel-for primitive and the
//! benchmark driver.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors that can occur while running a kernel invocation.
///
/// All errors are local to a single invocation: nothing is retried, and a
/// failed parallel invocation may leave the output partially updated.
#[derive(Debug, Error)]
pub enum Error {
    /// A numeric argument is out of its valid domain (e.g. zero threads).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The output and input vectors don't have the same length.
    #[error("length mismatch: outputs have {outputs} elements but inputs have {inputs}")]
    LengthMismatch {
        /// Length of the output vector (Y).
        outputs: usize,
        /// Length of the input vector (X).
        inputs: usize,
    },

    /// Allocating a vector failed.
    #[error("failed to allocate a vector of {len} elements")]
    Allocation {
        /// Requested number of elements.
        len: usize,
        /// Underlying allocation error.
        #[source]
        source: TryReserveError,
    },

    /// The available parallelism couldn't be queried from the operating
    /// system.
    #[error("failed to query the available parallelism")]
    AvailableParallelism(#[source] std::io::Error),

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread #{worker}")]
    Spawn {
        /// Index of the worker that couldn't be spawned.
        worker: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// One or more worker threads panicked.
    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked {
        /// Number of workers that panicked.
        count: usize,
    },

    /// A worker thread couldn't be pinned to its CPU.
    #[error("failed to pin worker thread #{worker} to a CPU: {reason}")]
    CpuPinning {
        /// Index of the worker thread.
        worker: usize,
        /// Description of the failure.
        reason: String,
    },
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
