// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Static partitioning of an index range into contiguous chunks, one per
//! worker thread.

use crossbeam_utils::CachePadded;
use std::iter::FusedIterator;
use std::mem::{align_of, size_of};
use std::num::NonZeroUsize;
use std::ops::Range;

/// Strategy to split `0..num_elements` among worker threads.
///
/// Whatever the strategy, the resulting ranges are contiguous, pairwise
/// disjoint, sorted in increasing order, and their union is exactly
/// `0..num_elements`. Some ranges may be empty when there are more threads
/// than elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RangeStrategy {
    /// Each thread gets `num_elements / num_threads` items, and the last thread
    /// additionally absorbs the remainder of the division.
    #[default]
    RemainderLast,
    /// Thread `i` gets the range `i * n / t .. (i + 1) * n / t`, so that range
    /// sizes differ by at most one.
    Balanced,
    /// Interior boundaries are placed on cache line boundaries of the output
    /// slice, so that no two threads write to the same cache line. Whole cache
    /// lines are spread evenly, and the first and last threads absorb the
    /// unaligned head and tail of the slice.
    CacheAligned,
}

/// Placement of cache lines within a slice, in units of elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Granule {
    /// Number of elements per cache line.
    size: usize,
    /// Index of the first element that starts a cache line.
    offset: usize,
}

impl Granule {
    /// A granule of one element, i.e. no alignment constraint.
    const UNIT: Granule = Granule { size: 1, offset: 0 };

    /// Computes the cache line placement for the given slice.
    fn of_slice<T>(slice: &[T]) -> Self {
        let line = align_of::<CachePadded<T>>();
        let elem = size_of::<T>();
        if elem == 0 || elem > line || line % elem != 0 {
            return Granule::UNIT;
        }
        let misalignment = slice.as_ptr() as usize % line;
        if misalignment % elem != 0 {
            return Granule::UNIT;
        }
        Granule {
            size: line / elem,
            offset: ((line - misalignment) % line) / elem,
        }
    }
}

/// Returns the number of elements of type `T` that fit in a cache line, as
/// measured by the alignment of [`CachePadded`].
pub fn elements_per_cache_line<T>() -> usize {
    match size_of::<T>() {
        0 => 1,
        elem => (align_of::<CachePadded<T>>() / elem).max(1),
    }
}

/// Splits `0..num_elements` into `num_threads` ranges.
///
/// With [`RangeStrategy::CacheAligned`], there is no slice to align to, so
/// this behaves as if the data started on a cache line boundary with one
/// element per cache line, which is the same as
/// [`RangeStrategy::Balanced`]. Use [`partitions_for_slice()`] to align on
/// the actual memory layout.
///
/// ```
/// # use paraxpy::{partitions, RangeStrategy};
/// # use std::num::NonZeroUsize;
/// let ranges = partitions(10, NonZeroUsize::new(3).unwrap(), RangeStrategy::RemainderLast)
///     .collect::<Vec<_>>();
/// assert_eq!(ranges, [0..3, 3..6, 6..10]);
/// ```
pub fn partitions(
    num_elements: usize,
    num_threads: NonZeroUsize,
    strategy: RangeStrategy,
) -> Partitions {
    Partitions::new(num_elements, num_threads, strategy, Granule::UNIT)
}

/// Splits the indices of the given slice into `num_threads` ranges, taking
/// the memory layout of the slice into account for
/// [`RangeStrategy::CacheAligned`].
pub fn partitions_for_slice<T>(
    slice: &[T],
    num_threads: NonZeroUsize,
    strategy: RangeStrategy,
) -> Partitions {
    let granule = match strategy {
        RangeStrategy::CacheAligned => Granule::of_slice(slice),
        RangeStrategy::RemainderLast | RangeStrategy::Balanced => Granule::UNIT,
    };
    Partitions::new(slice.len(), num_threads, strategy, granule)
}

/// Iterator over the ranges assigned to each worker thread, in order of thread
/// index.
#[derive(Clone, Debug)]
pub struct Partitions {
    /// Total number of elements to split.
    num_elements: usize,
    /// Number of ranges to produce.
    num_threads: usize,
    /// Splitting strategy.
    strategy: RangeStrategy,
    /// Cache line placement, only used by [`RangeStrategy::CacheAligned`].
    granule: Granule,
    /// Index of the next thread to yield a range for.
    next_thread: usize,
}

impl Partitions {
    fn new(
        num_elements: usize,
        num_threads: NonZeroUsize,
        strategy: RangeStrategy,
        granule: Granule,
    ) -> Self {
        Self {
            num_elements,
            num_threads: num_threads.get(),
            strategy,
            granule,
            next_thread: 0,
        }
    }

    /// Returns the range assigned to the given thread.
    pub fn range(&self, thread_id: usize) -> Range<usize> {
        assert!(
            thread_id < self.num_threads,
            "thread index {thread_id} out of bounds for {} threads",
            self.num_threads
        );
        self.boundary(thread_id)..self.boundary(thread_id + 1)
    }

    /// Returns the start of the range of the given thread, or `num_elements`
    /// for `thread_id == num_threads`.
    fn boundary(&self, thread_id: usize) -> usize {
        let n = self.num_elements;
        let t = self.num_threads;
        if thread_id == 0 {
            return 0;
        }
        if thread_id == t {
            return n;
        }
        match self.strategy {
            RangeStrategy::RemainderLast => thread_id * (n / t),
            RangeStrategy::Balanced => proportion(n, thread_id, t),
            RangeStrategy::CacheAligned => {
                let Granule { size, offset } = self.granule;
                let num_lines = n.saturating_sub(offset) / size;
                (offset + proportion(num_lines, thread_id, t) * size).min(n)
            }
        }
    }
}

/// Computes `value * numerator / denominator` without intermediate overflow.
fn proportion(value: usize, numerator: usize, denominator: usize) -> usize {
    // The result is at most `value` because `numerator <= denominator`.
    (value as u128 * numerator as u128 / denominator as u128) as usize
}

impl Iterator for Partitions {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.next_thread == self.num_threads {
            return None;
        }
        let range = self.range(self.next_thread);
        self.next_thread += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_threads - self.next_thread;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Partitions {}

impl FusedIterator for Partitions {}
