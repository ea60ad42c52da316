// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

fn main() {
    divan::main();
}

const NUM_THREADS: &[usize] = &[1, 2, 4, 8];
const LENGTHS: &[usize] = &[10_000, 100_000, 1_000_000];
const SCALAR: f32 = 0.1234;

/// Creates the `(x, y)` input vectors of the given length.
fn inputs(len: usize) -> (Vec<f32>, Vec<f32>) {
    let x = (0..len).map(|i| (i % 1000) as f32).collect();
    let y = vec![0.0; len];
    (x, y)
}

/// Baseline benchmarks using a serial loop (without any multi-threading
/// involved).
mod serial {
    use super::{LENGTHS, SCALAR};
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};

    #[divan::bench(args = LENGTHS)]
    fn axpy(bencher: Bencher, len: usize) {
        let (x, mut y) = super::inputs(len);
        let x_slice = x.as_slice();
        let y_slice = y.as_mut_slice();

        bencher
            .counter(BytesCount::of_many::<f32>(len * 2))
            .bench_local(|| paraxpy::axpy(black_box(&mut *y_slice), black_box(x_slice), SCALAR))
    }
}

/// Benchmarks using Rayon.
mod rayon {
    use super::{LENGTHS, NUM_THREADS, SCALAR};
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};
    use rayon::iter::{
        IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator,
        ParallelIterator,
    };

    #[divan::bench(consts = NUM_THREADS, args = LENGTHS)]
    fn axpy_rayon<const NUM_THREADS: usize>(bencher: Bencher, len: usize) {
        let (x, mut y) = super::inputs(len);
        let x_slice = x.as_slice();
        let y_slice = y.as_mut_slice();

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(NUM_THREADS)
            .build()
            .unwrap();
        // divan::Bencher isn't Send, so each iteration enters the Rayon thread pool
        // separately.
        bencher
            .counter(BytesCount::of_many::<f32>(len * 2))
            .bench_local(|| {
                thread_pool.install(|| {
                    black_box(&mut *y_slice)
                        .par_iter_mut()
                        .zip(black_box(x_slice).par_iter())
                        .for_each(|(y, &x)| *y = *y + SCALAR * x)
                })
            });
    }
}

/// Benchmarks using the statically chunked kernel.
mod paraxpy {
    use super::{LENGTHS, NUM_THREADS, SCALAR};
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};
    use paraxpy::{
        CpuPinningPolicy, Kernel, ParallelFor, ParallelKernel, RangeStrategy, ThreadCount,
    };

    fn axpy(bencher: Bencher, range_strategy: RangeStrategy, num_threads: usize, len: usize) {
        let (x, mut y) = super::inputs(len);
        let x_slice = x.as_slice();
        let y_slice = y.as_mut_slice();

        let kernel = ParallelKernel::with_config(ParallelFor {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            range_strategy,
            cpu_pinning: CpuPinningPolicy::IfSupported,
        });

        bencher
            .counter(BytesCount::of_many::<f32>(len * 2))
            .bench_local(|| {
                kernel
                    .apply(black_box(&mut *y_slice), black_box(x_slice), SCALAR)
                    .unwrap()
            });
    }

    #[divan::bench(consts = NUM_THREADS, args = LENGTHS)]
    fn axpy_remainder_last<const NUM_THREADS: usize>(bencher: Bencher, len: usize) {
        axpy(bencher, RangeStrategy::RemainderLast, NUM_THREADS, len)
    }

    #[divan::bench(consts = NUM_THREADS, args = LENGTHS)]
    fn axpy_balanced<const NUM_THREADS: usize>(bencher: Bencher, len: usize) {
        axpy(bencher, RangeStrategy::Balanced, NUM_THREADS, len)
    }

    #[divan::bench(consts = NUM_THREADS, args = LENGTHS)]
    fn axpy_cache_aligned<const NUM_THREADS: usize>(bencher: Bencher, len: usize) {
        axpy(bencher, RangeStrategy::CacheAligned, NUM_THREADS, len)
    }
}
