//! Static, contiguous partition of each order's clusters across workers.

use std::ops::Range;
use crate::{
    error::{ CceError, CceResult },
    transport::Rank,
};

/// Half-open index range `[lo, hi)` of one order's cluster list assigned to a
/// single worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkSlice {
    pub lo: usize,
    pub hi: usize,
}

impl WorkSlice {
    /// Number of clusters in the slice.
    pub fn len(&self) -> usize { self.hi - self.lo }

    pub fn is_empty(&self) -> bool { self.hi == self.lo }

    /// Return the slice as a [`Range`].
    pub fn range(&self) -> Range<usize> { self.lo..self.hi }

    /// Return `true` if the slice covers `index`.
    pub fn contains(&self, index: usize) -> bool { self.range().contains(&index) }
}

/// Block boundaries for worker `r` of `w` over `n` items: the first `n % w`
/// workers receive one extra item.
fn block_start(n: usize, w: usize, r: usize) -> usize {
    let base = n / w;
    let rem = n % w;
    r * base + r.min(rem)
}

/// Per-order, per-worker [`WorkSlice`]s.
///
/// Slices for an order exactly cover that order's index range, do not overlap,
/// are non-decreasing in rank, and differ in length by at most one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    workers: usize,
    counts: Vec<usize>,
    // bounds[order][r] is the start of rank r's slice; bounds[order][workers]
    // is the order's cluster count
    bounds: Vec<Vec<usize>>,
}

impl Partition {
    /// Partition each order's cluster count across `workers` workers.
    pub fn new(counts: &[usize], workers: usize) -> CceResult<Self> {
        if workers == 0 {
            return Err(CceError::config("worker count must be positive"));
        }
        let bounds
            = counts.iter()
            .map(|&n| (0..=workers).map(|r| block_start(n, workers, r)).collect())
            .collect();
        Ok(Self { workers, counts: counts.to_vec(), bounds })
    }

    /// Number of workers.
    pub fn workers(&self) -> usize { self.workers }

    /// Number of orders.
    pub fn max_order(&self) -> usize { self.counts.len() }

    /// Total cluster count at each order.
    pub fn counts(&self) -> &[usize] { &self.counts }

    /// The slice of order `order` assigned to `rank`.
    ///
    /// *Panics* if `rank` or `order` is out of bounds.
    pub fn slice(&self, rank: Rank, order: usize) -> WorkSlice {
        let b = &self.bounds[order];
        WorkSlice { lo: b[rank], hi: b[rank + 1] }
    }

    /// All slices of an order, by rank.
    pub fn slices(&self, order: usize) -> impl Iterator<Item = WorkSlice> + '_ {
        (0..self.workers).map(move |r| self.slice(r, order))
    }

    /// Number of clusters assigned to `rank` at each order.
    pub fn worker_counts(&self, rank: Rank) -> Vec<usize> {
        (0..self.max_order()).map(|k| self.slice(rank, k).len()).collect()
    }

    /// Byte offset of `rank`'s block within an order's column-major result
    /// buffer of `n_time` `f64` samples per cluster.
    pub fn byte_offset(&self, rank: Rank, order: usize, n_time: usize) -> usize {
        self.slice(rank, order).lo * n_time * std::mem::size_of::<f64>()
    }

    /// Byte length of `rank`'s block; see [`Self::byte_offset`].
    pub fn byte_len(&self, rank: Rank, order: usize, n_time: usize) -> usize {
        self.slice(rank, order).len() * n_time * std::mem::size_of::<f64>()
    }
}
