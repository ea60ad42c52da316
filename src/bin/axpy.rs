// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to benchmark the serial and parallel AXPY kernels.

use clap::{Parser, ValueEnum};
use paraxpy::report::{Measurement, Report};
use paraxpy::{
    CpuPinningPolicy, Error, ParallelFor, ParallelKernel, RangeStrategy, Real, Result,
    SerialKernel, ThreadCount,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::error::Error as _;
use std::num::NonZeroUsize;
use std::process::ExitCode;

const DEFAULT_LEN: usize = 102_400;
const DEFAULT_NUM_THREADS: usize = 4;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if is_bare_invocation(std::env::args_os()) {
        eprintln!(
            "Usage: axpy <n> [<num_threads>] (The default of n is {DEFAULT_LEN}, the default num_threads is {DEFAULT_NUM_THREADS})"
        );
    }

    match run(&cli) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("Caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

/// Whether the program was run without any argument, in which case a usage
/// hint is printed before running with the defaults.
fn is_bare_invocation(args: impl ExactSizeIterator) -> bool {
    args.len() < 2
}

/// Runs the benchmark at the precision selected on the command line.
fn run(cli: &Cli) -> Result<Report> {
    match cli.precision {
        Precision::F32 => run_with::<f32>(cli),
        Precision::F64 => run_with::<f64>(cli),
    }
}

/// Runs the serial kernel and then the parallel kernel on the same vectors,
/// each `cli.runs` times, and collects their average runtimes.
fn run_with<T: Real>(cli: &Cli) -> Result<Report> {
    let len = cli.len.map_or(DEFAULT_LEN, NonZeroUsize::get);
    let num_threads = match cli.num_threads {
        Some(num_threads) => ThreadCount::Count(num_threads),
        None => ThreadCount::try_from(DEFAULT_NUM_THREADS)?,
    };
    let a: T = cast(cli.scalar)?;

    log::info!(
        "Running AXPY on {len} {} elements, {num_threads:?}, {} runs",
        std::any::type_name::<T>(),
        cli.runs
    );

    let mut rng = ChaCha12Rng::seed_from_u64(cli.seed);
    let x = random_vector::<T>(&mut rng, len)?;
    let mut y = random_vector::<T>(&mut rng, len)?;

    let parallel_kernel = ParallelKernel::with_config(ParallelFor {
        num_threads,
        range_strategy: cli.range_strategy.into(),
        cpu_pinning: if cli.pin_cpus {
            CpuPinningPolicy::IfSupported
        } else {
            CpuPinningPolicy::No
        },
    });

    let serial = Measurement::of_kernel(&SerialKernel, &mut y, &x, a, cli.runs)?;
    let parallel = Measurement::of_kernel(&parallel_kernel, &mut y, &x, a, cli.runs)?;

    Ok(Report {
        num_elements: len,
        measurements: vec![serial, parallel],
    })
}

/// Creates a vector of `len` values uniformly distributed in `[0, 1)`.
///
/// Allocation failures are reported as an error rather than aborting.
fn random_vector<T: Real>(rng: &mut impl Rng, len: usize) -> Result<Vec<T>> {
    let mut vector = Vec::new();
    vector
        .try_reserve_exact(len)
        .map_err(|source| Error::Allocation { len, source })?;
    for _ in 0..len {
        vector.push(cast(rng.random::<f64>())?);
    }
    Ok(vector)
}

/// Converts a value to the benchmark's element type.
fn cast<T: Real>(value: f64) -> Result<T> {
    num_traits::cast(value).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{value} is not representable as {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Benchmark of a statically chunked parallel AXPY (Y += a*X) against a serial
/// loop.
#[derive(Parser, Debug, PartialEq)]
#[command(version)]
struct Cli {
    /// Length of the vectors [default: 102400].
    #[arg(value_name = "N")]
    len: Option<NonZeroUsize>,

    /// Number of worker threads of the parallel kernel [default: 4].
    #[arg(value_name = "NUM_THREADS")]
    num_threads: Option<NonZeroUsize>,

    /// Number of runs to average over, for each kernel.
    #[arg(long, default_value = "10")]
    runs: NonZeroUsize,

    /// Scalar multiplier `a`.
    #[arg(long, default_value_t = 0.1234)]
    scalar: f64,

    /// Floating-point precision of the vectors.
    #[arg(long, value_enum, default_value_t = Precision::F32)]
    precision: Precision,

    /// Policy to split work among threads.
    #[arg(long, value_enum, default_value_t = RangeStrategyCli::RemainderLast)]
    range_strategy: RangeStrategyCli,

    /// Pin each worker thread to a CPU, if supported on this platform.
    #[arg(long, default_value_t = false)]
    pin_cpus: bool,

    /// Seed of the random number generator that fills the vectors.
    #[arg(long, default_value_t = 1 << 12)]
    seed: u64,
}

/// Floating-point precision.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Precision {
    /// Single precision.
    F32,
    /// Double precision.
    F64,
}

/// Policy to split work among threads.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RangeStrategyCli {
    /// Equal chunks, the last thread takes the remainder.
    RemainderLast,
    /// Chunk sizes differ by at most one item.
    Balanced,
    /// Chunk boundaries are aligned to cache lines.
    CacheAligned,
}

impl From<RangeStrategyCli> for RangeStrategy {
    fn from(range_strategy: RangeStrategyCli) -> Self {
        match range_strategy {
            RangeStrategyCli::RemainderLast => RangeStrategy::RemainderLast,
            RangeStrategyCli::Balanced => RangeStrategy::Balanced,
            RangeStrategyCli::CacheAligned => RangeStrategy::CacheAligned,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::error::ErrorKind;

    fn non_zero(n: usize) -> NonZeroUsize {
        NonZeroUsize::try_from(n).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["axpy"]).unwrap();
        assert_eq!(
            cli,
            Cli {
                len: None,
                num_threads: None,
                runs: non_zero(10),
                scalar: 0.1234,
                precision: Precision::F32,
                range_strategy: RangeStrategyCli::RemainderLast,
                pin_cpus: false,
                seed: 4096,
            }
        );
    }

    #[test]
    fn test_cli_positional() {
        let cli = Cli::try_parse_from(["axpy", "1000"]).unwrap();
        assert_eq!(cli.len, Some(non_zero(1000)));
        assert_eq!(cli.num_threads, None);

        let cli = Cli::try_parse_from(["axpy", "1000", "8"]).unwrap();
        assert_eq!(cli.len, Some(non_zero(1000)));
        assert_eq!(cli.num_threads, Some(non_zero(8)));
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from([
            "axpy",
            "64",
            "2",
            "--runs",
            "3",
            "--scalar=-2.5",
            "--precision",
            "f64",
            "--range-strategy",
            "cache-aligned",
            "--pin-cpus",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.runs, non_zero(3));
        assert_eq!(cli.scalar, -2.5);
        assert_eq!(cli.precision, Precision::F64);
        assert_eq!(cli.range_strategy, RangeStrategyCli::CacheAligned);
        assert!(cli.pin_cpus);
        assert_eq!(cli.seed, 7);
    }

    #[test]
    fn test_cli_rejects_invalid_numbers() {
        for args in [
            ["axpy", "0", "4"],
            ["axpy", "100", "0"],
            ["axpy", "abc", "4"],
            ["axpy", "100", "four"],
        ] {
            let error = Cli::try_parse_from(args).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::ValueValidation, "{args:?}");
        }
    }

    #[test]
    fn test_usage_hint_only_without_arguments() {
        assert!(is_bare_invocation(["axpy"].into_iter()));
        assert!(!is_bare_invocation(["axpy", "1000"].into_iter()));
        assert!(!is_bare_invocation(["axpy", "--runs", "3"].into_iter()));
    }

    #[test]
    fn test_run_report() {
        for precision in ["f32", "f64"] {
            let cli = Cli::try_parse_from([
                "axpy",
                "1000",
                "3",
                "--runs",
                "2",
                "--precision",
                precision,
            ])
            .unwrap();
            let report = run(&cli).unwrap();
            assert_eq!(report.num_elements, 1000);
            let labels = report
                .measurements
                .iter()
                .map(|m| m.label.as_str())
                .collect::<Vec<_>>();
            assert_eq!(labels, ["serial", "3 threads"]);
        }
    }

    #[test]
    fn test_random_vector_is_reproducible() {
        let x = random_vector::<f32>(&mut ChaCha12Rng::seed_from_u64(4096), 100).unwrap();
        let y = random_vector::<f32>(&mut ChaCha12Rng::seed_from_u64(4096), 100).unwrap();
        assert_eq!(x, y);
        assert!(x.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_random_vector_allocation_failure() {
        let result = random_vector::<f64>(&mut ChaCha12Rng::seed_from_u64(0), usize::MAX);
        assert!(matches!(
            result,
            Err(Error::Allocation { len: usize::MAX, .. })
        ));
    }
}
