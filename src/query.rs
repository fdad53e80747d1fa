//! Range query aggregation
//!
//! Answers multi-bucket questions by repeated single-bucket reads:
//!
//! - [`query_counts`]: one estimate per window from `start` to `stop`
//! - [`query_topk`]: the finalized ranked keys for the window containing an epoch
//!
//! Neither function mutates state. Each estimator read takes the
//! coordinator lock on its own, so a long range never blocks writers for
//! more than one read at a time.

use crate::coordinator::WindowCoordinator;
use crate::error::{Error, Result};
use crate::sketch::TopKAccumulator;
use crate::types::{Epoch, Weight};
use parking_lot::Mutex;

/// Estimates for `key` in each window from `start` to `stop` inclusive
///
/// `t` steps from `start` by the window width, so the result is in
/// chronological order. Both bounds must be at or after the anchor epoch.
/// A range with `start > stop` yields an empty sequence. Ranges covering
/// more than `max_buckets` steps are rejected with `InvalidRange`.
pub fn query_counts(
    coordinator: &WindowCoordinator,
    key: &str,
    start: Epoch,
    stop: Epoch,
    max_buckets: usize,
) -> Result<Vec<Weight>> {
    let grid = coordinator.grid();
    let invalid = || Error::InvalidRange {
        start,
        stop,
        anchor: grid.anchor(),
    };

    if start < grid.anchor() || stop < grid.anchor() {
        return Err(invalid());
    }
    if start > stop {
        return Ok(Vec::new());
    }

    let steps = (stop.saturating_sub(start) / grid.width()) as u64 + 1;
    if steps > max_buckets as u64 {
        return Err(invalid());
    }

    // start + i * width never passes stop, so it cannot overflow
    (0..steps as i64)
        .map(|i| coordinator.count(start + i * grid.width(), key))
        .collect()
}

/// Ranked keys for the finalized window containing `epoch`
///
/// Fails with `InvalidEpoch` before the anchor and `OutOfRange` when the
/// window is still open or has been evicted from history.
pub fn query_topk(
    coordinator: &WindowCoordinator,
    topk: &Mutex<Box<dyn TopKAccumulator>>,
    epoch: Epoch,
) -> Result<Vec<String>> {
    let bucket = coordinator.grid().bucket_index(epoch)?;
    let history = topk.lock();
    match history.keys(bucket) {
        Some(keys) => Ok(keys.to_vec()),
        None => Err(Error::OutOfRange {
            bucket,
            oldest: history.oldest(),
            retained: history.len(),
        }),
    }
}
