// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod error;
mod kernel;
mod macros;
mod parallel_for;
mod partition;
pub mod report;

pub use error::{Error, Result};
pub use kernel::{axpy, Kernel, ParallelKernel, Real, SerialKernel};
pub use parallel_for::{CpuPinningPolicy, ParallelFor, Task, ThreadCount};
pub use partition::{
    elements_per_cache_line, partitions, partitions_for_slice, Partitions, RangeStrategy,
};
