// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Timing of repeated kernel runs and the performance report.

use crate::error::{Error, Result};
use crate::kernel::{Kernel, Real};
use crate::macros::log_debug;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Floating-point operations per element of an AXPY: one multiplication and
/// one addition.
pub const FLOPS_PER_ELEMENT: f64 = 2.0;

/// Computes the throughput of an AXPY over `num_elements` elements that took
/// `elapsed`, in millions of floating-point operations per second.
///
/// Returns infinity if `elapsed` is zero.
pub fn mflops(num_elements: usize, elapsed: Duration) -> f64 {
    FLOPS_PER_ELEMENT * num_elements as f64 / (1.0e6 * elapsed.as_secs_f64())
}

/// Runs `f` the given number of times, and returns the average time per run.
///
/// Stops at the first error.
pub fn time_runs(num_runs: NonZeroUsize, mut f: impl FnMut() -> Result<()>) -> Result<Duration> {
    let divisor = u32::try_from(num_runs.get()).map_err(|_| {
        Error::InvalidArgument(format!("too many runs: {num_runs} (at most {})", u32::MAX))
    })?;
    let start = Instant::now();
    for _ in 0..num_runs.get() {
        f()?;
    }
    Ok(start.elapsed() / divisor)
}

/// Average runtime of a kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Name of the measured kernel.
    pub label: String,
    /// Average wall-clock time of one run.
    pub elapsed_per_run: Duration,
}

impl Measurement {
    /// Runs the kernel `num_runs` times on the given vectors and measures the
    /// average runtime.
    ///
    /// The kernel accumulates into `y`, which is therefore updated
    /// `num_runs` times.
    pub fn of_kernel<T: Real, K: Kernel<T>>(
        kernel: &K,
        y: &mut [T],
        x: &[T],
        a: T,
        num_runs: NonZeroUsize,
    ) -> Result<Self> {
        let label = kernel.name();
        log_debug!("Measuring {label} over {num_runs} runs");
        let elapsed_per_run = time_runs(num_runs, || kernel.apply(y, x, a))?;
        Ok(Self {
            label,
            elapsed_per_run,
        })
    }

    /// Average runtime in milliseconds.
    pub fn runtime_ms(&self) -> f64 {
        self.elapsed_per_run.as_secs_f64() * 1.0e3
    }
}

/// Performance report comparing several kernels on vectors of the same
/// length.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Length of the vectors.
    pub num_elements: usize,
    /// One measurement per kernel, in display order.
    pub measurements: Vec<Measurement>,
}

const RULE_WIDTH: usize = 102;

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let double_rule = "=".repeat(RULE_WIDTH);
        let rule = "-".repeat(RULE_WIDTH);
        writeln!(f, "{double_rule}")?;
        writeln!(
            f,
            "\tAXPY {} numbers, serial and threading",
            self.num_elements
        )?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Performance:\t\tRuntime (ms)\t MFLOPS ")?;
        writeln!(f, "{rule}")?;
        for measurement in &self.measurements {
            writeln!(
                f,
                "AXPY-{}:\t\t{:.6}\t{:.6}",
                measurement.label,
                measurement.runtime_ms(),
                mflops(self.num_elements, measurement.elapsed_per_run)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::{ParallelKernel, SerialKernel};

    #[test]
    fn test_mflops() {
        assert_eq!(mflops(1_000_000, Duration::from_secs(1)), 2.0);
        assert_eq!(mflops(500_000, Duration::from_millis(1)), 1000.0);
        assert_eq!(mflops(1, Duration::ZERO), f64::INFINITY);
    }

    #[test]
    fn test_time_runs_counts_calls() {
        let mut calls = 0;
        time_runs(NonZeroUsize::try_from(10).unwrap(), || {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_time_runs_stops_on_error() {
        let mut calls = 0;
        let result = time_runs(NonZeroUsize::try_from(10).unwrap(), || {
            calls += 1;
            if calls == 3 {
                Err(Error::InvalidArgument("boom".to_owned()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_measurement_accumulates() {
        let x = vec![1.0f32; 100];
        let mut y = vec![0.0f32; 100];
        let runs = NonZeroUsize::try_from(10).unwrap();

        let serial = Measurement::of_kernel(&SerialKernel, &mut y, &x, 0.5, runs).unwrap();
        assert_eq!(serial.label, "serial");
        assert!(y.iter().all(|&v| v == 5.0));

        let parallel =
            Measurement::of_kernel(&ParallelKernel::new(4).unwrap(), &mut y, &x, 0.5, runs)
                .unwrap();
        assert_eq!(parallel.label, "4 threads");
        assert!(y.iter().all(|&v| v == 10.0));
    }

    #[test]
    fn test_report_display() {
        let report = Report {
            num_elements: 1_000_000,
            measurements: vec![
                Measurement {
                    label: "serial".to_owned(),
                    elapsed_per_run: Duration::from_millis(2),
                },
                Measurement {
                    label: "4 threads".to_owned(),
                    elapsed_per_run: Duration::from_micros(500),
                },
            ],
        };
        let text = report.to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "=".repeat(102));
        assert_eq!(lines[1], "\tAXPY 1000000 numbers, serial and threading");
        assert_eq!(lines[3], "Performance:\t\tRuntime (ms)\t MFLOPS ");
        assert_eq!(lines[5], "AXPY-serial:\t\t2.000000\t1000.000000");
        assert_eq!(lines[6], "AXPY-4 threads:\t\t0.500000\t4000.000000");
    }
}
