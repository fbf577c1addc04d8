//! Partitioning of the discovered tests into fixed-size batches.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Contiguous, order-preserving partition of `total` items into batches of
/// `batch_size` (the last batch may be smaller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    total: usize,
    batch_size: NonZeroUsize,
}

impl BatchPlan {
    pub fn new(total: usize, batch_size: NonZeroUsize) -> Self {
        Self { total, batch_size }
    }

    /// Number of batches: `ceil(total / batch_size)`.
    pub fn batch_count(&self) -> usize {
        self.total.div_ceil(self.batch_size.get())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Index range of batch `k`: `[k*B, min((k+1)*B, N))`.
    pub fn batch(&self, k: usize) -> Option<Range<usize>> {
        if k >= self.batch_count() {
            return None;
        }
        let start = k * self.batch_size.get();
        let end = (start + self.batch_size.get()).min(self.total);
        Some(start..end)
    }

    /// All batch ranges in order.
    pub fn batches(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.batch_count()).filter_map(move |k| self.batch(k))
    }
}
