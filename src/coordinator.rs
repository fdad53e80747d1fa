//! Windowing coordinator
//!
//! Owns the [`WindowGrid`] and serializes every call into the frequency
//! estimator behind one mutex. The lock is held for exactly one estimator
//! call: a write may evict old windows, so reads and writes never overlap.

use crate::error::Result;
use crate::sketch::FrequencyEstimator;
use crate::types::{BucketIndex, Epoch, WindowGrid, Weight};
use parking_lot::Mutex;

/// Locked read/write surface over a frequency estimator
pub struct WindowCoordinator {
    grid: WindowGrid,
    estimator: Mutex<Box<dyn FrequencyEstimator>>,
}

impl WindowCoordinator {
    /// Wrap `estimator`, mapping timestamps with `grid`
    pub fn new(grid: WindowGrid, estimator: Box<dyn FrequencyEstimator>) -> Self {
        Self {
            grid,
            estimator: Mutex::new(estimator),
        }
    }

    /// Window mapping used by this coordinator
    pub fn grid(&self) -> WindowGrid {
        self.grid
    }

    /// Add `weight` occurrences of `key` at `epoch`
    ///
    /// Returns the bucket written to. Fails with `InvalidEpoch` before the
    /// anchor, without touching the estimator.
    pub fn add(&self, epoch: Epoch, key: &str, weight: Weight) -> Result<BucketIndex> {
        let bucket = self.grid.bucket_index(epoch)?;
        self.estimator.lock().add(bucket, key, weight);
        Ok(bucket)
    }

    /// Estimated count of `key` in the bucket containing `epoch`
    pub fn count(&self, epoch: Epoch, key: &str) -> Result<Weight> {
        let bucket = self.grid.bucket_index(epoch)?;
        Ok(self.estimator.lock().count(bucket, key))
    }

    /// Newest bucket the estimator has observed
    pub fn newest_bucket(&self) -> Option<BucketIndex> {
        self.estimator.lock().newest_bucket()
    }
}

impl std::fmt::Debug for WindowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCoordinator")
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sketch::WindowedSketch;
    use std::sync::Arc;

    fn coordinator() -> WindowCoordinator {
        let grid = WindowGrid::new(1000, 60).unwrap();
        WindowCoordinator::new(grid, Box::new(WindowedSketch::new(10, 4, 6)))
    }

    #[test]
    fn test_same_bucket_accumulates() {
        let coord = coordinator();
        coord.add(1005, "x", 3).unwrap();
        coord.add(1050, "x", 2).unwrap();
        assert_eq!(coord.count(1010, "x").unwrap(), 5);

        coord.add(1065, "x", 7).unwrap();
        assert_eq!(coord.count(1070, "x").unwrap(), 7);
        assert_eq!(coord.count(1010, "x").unwrap(), 5);
    }

    #[test]
    fn test_before_anchor_rejected() {
        let coord = coordinator();
        assert!(matches!(
            coord.add(999, "x", 1),
            Err(Error::InvalidEpoch { .. })
        ));
        assert!(matches!(
            coord.count(10, "x"),
            Err(Error::InvalidEpoch { .. })
        ));
        assert_eq!(coord.newest_bucket(), None);
    }

    #[test]
    fn test_concurrent_adds() {
        let coord = Arc::new(coordinator());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coord = Arc::clone(&coord);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        coord.add(1001, "hot", 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(coord.count(1001, "hot").unwrap(), 8000);
    }
}
