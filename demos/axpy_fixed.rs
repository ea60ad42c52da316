// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that computes `Y += a * X` with the parallel kernel, using
//! one fixed chunk per available CPU.

use paraxpy::{CpuPinningPolicy, Kernel, ParallelFor, ParallelKernel, RangeStrategy, ThreadCount};
use std::hint::black_box;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let kernel = ParallelKernel::with_config(ParallelFor {
        num_threads: ThreadCount::AvailableParallelism,
        range_strategy: RangeStrategy::RemainderLast,
        cpu_pinning: CpuPinningPolicy::IfSupported,
    });

    let input_size = 100_000_000;

    let x = (0..input_size).map(|i| i as f32).collect::<Vec<f32>>();
    let mut y = vec![1.0f32; input_size];

    if let Err(e) = kernel.apply(black_box(y.as_mut_slice()), black_box(x.as_slice()), 0.5) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    println!("updated {} elements", black_box(y).len());
    ExitCode::SUCCESS
}
