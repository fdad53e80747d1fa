//! Frequency estimation and top-K tracking
//!
//! The windowing layer only talks to these structures through the
//! [`FrequencyEstimator`] and [`TopKAccumulator`] traits. The concrete
//! implementations here are:
//!
//! - [`CountMinTable`]: a single count-min table
//! - [`WindowedSketch`]: one count-min table per window with bounded retention
//! - [`TopKHistory`]: per-window ranked key lists with bounded history
//!
//! Neither trait has an error channel; callers validate input before
//! forwarding it.

mod count_min;
mod topk;
mod windowed;

pub use count_min::{CountMinTable, MAX_WIDTH_BITS};
pub use topk::TopKHistory;
pub use windowed::WindowedSketch;

use crate::types::{BucketIndex, Weight};

/// Approximate per-window frequency counter
pub trait FrequencyEstimator: Send {
    /// Add `weight` occurrences of `key` to `bucket`
    ///
    /// Writes to a newer bucket may evict the oldest retained ones.
    /// Writes to buckets that have already been evicted are dropped.
    fn add(&mut self, bucket: BucketIndex, key: &str, weight: Weight);

    /// Estimated count of `key` in `bucket`
    ///
    /// Returns 0 for buckets that were never written or are no longer retained.
    fn count(&self, bucket: BucketIndex, key: &str) -> Weight;

    /// Newest bucket the estimator has observed, if any
    fn newest_bucket(&self) -> Option<BucketIndex>;
}

/// Per-window ranked candidate set with bounded history
pub trait TopKAccumulator: Send {
    /// Add `weight` to `key` in the open bucket
    fn insert(&mut self, key: &str, weight: Weight);

    /// Finalize the open bucket's top `k` keys into history and open a new bucket
    fn tick(&mut self, k: usize);

    /// Ranked keys for a finalized bucket, most frequent first
    fn keys(&self, bucket: BucketIndex) -> Option<&[String]>;

    /// Number of finalized buckets currently retained
    fn len(&self) -> usize;

    /// Whether no finalized bucket is retained
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the oldest retained finalized bucket
    fn oldest(&self) -> BucketIndex;

    /// Index of the open bucket (equals the number of ticks so far)
    fn open_bucket(&self) -> BucketIndex {
        self.oldest() + self.len() as BucketIndex
    }
}
