// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that computes `Y += a * X` with the serial kernel, to
//! compare profiles against the parallel version.

use paraxpy::axpy;
use std::hint::black_box;

fn main() {
    let input_size = 100_000_000;

    let x = (0..input_size).map(|i| i as f32).collect::<Vec<f32>>();
    let mut y = vec![1.0f32; input_size];

    axpy(black_box(y.as_mut_slice()), black_box(x.as_slice()), 0.5);
    println!("updated {} elements", black_box(y).len());
}
