//! Counter service
//!
//! [`CounterService`] is the single object the front door and the rotation
//! drivers share. It is configured once, owns the windowing coordinator and
//! the top-K accumulator, and exposes ingestion, rotation and queries.
//!
//! # Locking
//!
//! The estimator and the top-K accumulator sit behind separate mutexes.
//! Every operation takes each lock for one collaborator call only.
//! Ingestion that races a rotation may land in either the closing or the
//! opening top-K bucket; anything that completed before `rotate` was called
//! is in the finalized snapshot.
//!
//! # Example
//!
//! ```rust
//! use hokud::engine::{CounterService, CounterSettings};
//!
//! let settings = CounterSettings {
//!     estimator_width_bits: 10,
//!     ..CounterSettings::new(1000, 60)
//! };
//! let service = CounterService::configure(settings).unwrap();
//!
//! service.ingest_event(1005, "x", 3).unwrap();
//! service.ingest_event(1050, "x", 2).unwrap();
//! assert_eq!(service.query_counts("x", 1000, 1000).unwrap(), vec![5]);
//! ```

use crate::coordinator::WindowCoordinator;
use crate::error::{Error, Result};
use crate::query;
use crate::sketch::{
    FrequencyEstimator, TopKAccumulator, TopKHistory, WindowedSketch, MAX_WIDTH_BITS,
};
use crate::types::{BucketIndex, Epoch, Event, WindowGrid, Weight, HEARTBEAT_KEY};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Settings fixed when the service is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSettings {
    /// Timestamp of bucket 0
    pub anchor_epoch: Epoch,
    /// Seconds per bucket
    pub window_width: i64,
    /// Finalized buckets kept before the oldest is evicted
    pub retention_buckets: usize,
    /// Count-min columns per row, as a power of two
    pub estimator_width_bits: u32,
    /// Count-min rows
    pub estimator_depth: usize,
    /// Keys kept per finalized top-K bucket
    pub topk_depth: usize,
    /// Longest range a counts query may cover, in buckets
    pub max_query_buckets: usize,
}

impl CounterSettings {
    /// Settings with the default sketch dimensions
    pub fn new(anchor_epoch: Epoch, window_width: i64) -> Self {
        Self {
            anchor_epoch,
            window_width,
            retention_buckets: 6,
            estimator_width_bits: 20,
            estimator_depth: 5,
            topk_depth: 100,
            max_query_buckets: 10_000,
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.window_width <= 0 {
            return Err(Error::Configuration(
                "Window width must be > 0".to_string(),
            ));
        }
        if self.retention_buckets == 0 {
            return Err(Error::Configuration(
                "Retention must keep at least one bucket".to_string(),
            ));
        }
        if self.estimator_width_bits == 0 || self.estimator_width_bits > MAX_WIDTH_BITS {
            return Err(Error::Configuration(format!(
                "Estimator width bits must be in 1..={}",
                MAX_WIDTH_BITS
            )));
        }
        if self.estimator_depth == 0 {
            return Err(Error::Configuration(
                "Estimator depth must be > 0".to_string(),
            ));
        }
        if self.topk_depth == 0 {
            return Err(Error::Configuration("Top-K depth must be > 0".to_string()));
        }
        if self.max_query_buckets == 0 {
            return Err(Error::Configuration(
                "Max query buckets must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters kept by the service
#[derive(Debug, Default)]
struct ServiceStats {
    events_ingested: AtomicU64,
    events_rejected: AtomicU64,
    rotations: AtomicU64,
}

/// Snapshot of service state and counters
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatsSnapshot {
    /// Timestamp of bucket 0
    pub anchor_epoch: Epoch,
    /// Seconds per bucket
    pub window_width: i64,
    /// Bucket accepting top-K inserts
    pub open_bucket: BucketIndex,
    /// Finalized top-K buckets retained
    pub retained_buckets: usize,
    /// Newest bucket seen by the estimator
    pub newest_estimator_bucket: Option<BucketIndex>,
    /// Events accepted
    pub events_ingested: u64,
    /// Events rejected
    pub events_rejected: u64,
    /// Rotations performed
    pub rotations: u64,
}

/// Result of one rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Bucket that was finalized
    pub finalized: BucketIndex,
    /// Bucket now accepting inserts
    pub opened: BucketIndex,
    /// Finalized buckets retained after eviction
    pub retained: usize,
}

/// Windowed counting service
pub struct CounterService {
    settings: CounterSettings,
    coordinator: WindowCoordinator,
    topk: Mutex<Box<dyn TopKAccumulator>>,
    stats: ServiceStats,
}

impl CounterService {
    /// Build the service with the default sketch implementations
    pub fn configure(settings: CounterSettings) -> Result<Self> {
        settings.validate()?;
        let estimator = WindowedSketch::new(
            settings.estimator_width_bits,
            settings.estimator_depth,
            settings.retention_buckets,
        );
        let topk = TopKHistory::new(settings.retention_buckets);
        Self::with_collaborators(settings, Box::new(estimator), Box::new(topk))
    }

    /// Build the service around caller-supplied collaborators
    pub fn with_collaborators(
        settings: CounterSettings,
        estimator: Box<dyn FrequencyEstimator>,
        topk: Box<dyn TopKAccumulator>,
    ) -> Result<Self> {
        settings.validate()?;
        let grid = WindowGrid::new(settings.anchor_epoch, settings.window_width)?;
        debug!(
            anchor_epoch = settings.anchor_epoch,
            window_width = settings.window_width,
            retention = settings.retention_buckets,
            "Counter service configured"
        );
        Ok(Self {
            settings,
            coordinator: WindowCoordinator::new(grid, estimator),
            topk: Mutex::new(topk),
            stats: ServiceStats::default(),
        })
    }

    /// Settings the service was configured with
    pub fn settings(&self) -> &CounterSettings {
        &self.settings
    }

    /// Timestamp of bucket 0
    pub fn anchor_epoch(&self) -> Epoch {
        self.settings.anchor_epoch
    }

    /// Seconds per bucket
    pub fn window_width(&self) -> i64 {
        self.settings.window_width
    }

    /// Window mapping
    pub fn grid(&self) -> WindowGrid {
        self.coordinator.grid()
    }

    /// Record `weight` occurrences of `key` at `epoch`
    ///
    /// Writes the estimator bucket for `epoch` and the open top-K bucket.
    pub fn ingest_event(&self, epoch: Epoch, key: &str, weight: Weight) -> Result<BucketIndex> {
        let bucket = match self.coordinator.add(epoch, key, weight) {
            Ok(bucket) => bucket,
            Err(e) => {
                self.stats.events_rejected.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_rejection(e.kind());
                return Err(e);
            },
        };
        self.topk.lock().insert(key, weight);

        self.stats.events_ingested.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_ingest();
        Ok(bucket)
    }

    /// Record an [`Event`]
    pub fn ingest(&self, event: &Event) -> Result<BucketIndex> {
        self.ingest_event(event.epoch, &event.key, event.weight)
    }

    /// Finalize the open top-K bucket and open the next one
    ///
    /// Before ticking, a zero-weight heartbeat for the empty key is written
    /// at `now` so the estimator moves past idle windows. A `now` before the
    /// anchor skips the heartbeat but still rotates.
    pub fn rotate(&self, now: Epoch) -> Rotation {
        if let Err(e) = self.coordinator.add(now, HEARTBEAT_KEY, 0) {
            warn!(now, error = %e, "Heartbeat skipped");
        }

        let rotation = {
            let mut topk = self.topk.lock();
            let finalized = topk.open_bucket();
            topk.tick(self.settings.topk_depth);
            Rotation {
                finalized,
                opened: topk.open_bucket(),
                retained: topk.len(),
            }
        };

        self.stats.rotations.fetch_add(1, Ordering::Relaxed);
        debug!(
            now,
            finalized = rotation.finalized,
            opened = rotation.opened,
            retained = rotation.retained,
            "Rotated top-K bucket"
        );
        rotation
    }

    /// One estimate per window for `key` from `start` to `stop`
    pub fn query_counts(&self, key: &str, start: Epoch, stop: Epoch) -> Result<Vec<Weight>> {
        let result = query::query_counts(
            &self.coordinator,
            key,
            start,
            stop,
            self.settings.max_query_buckets,
        );
        crate::metrics::record_query("counts", result.is_ok());
        result
    }

    /// Ranked keys of the finalized window containing `epoch`
    pub fn query_topk(&self, epoch: Epoch) -> Result<Vec<String>> {
        let result = query::query_topk(&self.coordinator, &self.topk, epoch);
        crate::metrics::record_query("topk", result.is_ok());
        result
    }

    /// Estimated count of `key` in the window containing `epoch`
    pub fn count(&self, epoch: Epoch, key: &str) -> Result<Weight> {
        self.coordinator.count(epoch, key)
    }

    /// Bucket accepting top-K inserts
    pub fn open_bucket(&self) -> BucketIndex {
        self.topk.lock().open_bucket()
    }

    /// Finalized top-K buckets retained
    pub fn retained_buckets(&self) -> usize {
        self.topk.lock().len()
    }

    /// Finalized ranked lists currently retained, oldest first
    pub fn history(&self) -> Vec<(BucketIndex, Vec<String>)> {
        let topk = self.topk.lock();
        let oldest = topk.oldest();
        (oldest..topk.open_bucket())
            .filter_map(|bucket| topk.keys(bucket).map(|keys| (bucket, keys.to_vec())))
            .collect()
    }

    /// Snapshot of state and counters
    pub fn stats(&self) -> ServiceStatsSnapshot {
        let (open_bucket, retained_buckets) = {
            let topk = self.topk.lock();
            (topk.open_bucket(), topk.len())
        };
        ServiceStatsSnapshot {
            anchor_epoch: self.settings.anchor_epoch,
            window_width: self.settings.window_width,
            open_bucket,
            retained_buckets,
            newest_estimator_bucket: self.coordinator.newest_bucket(),
            events_ingested: self.stats.events_ingested.load(Ordering::Relaxed),
            events_rejected: self.stats.events_rejected.load(Ordering::Relaxed),
            rotations: self.stats.rotations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CounterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CounterSettings {
        CounterSettings {
            estimator_width_bits: 10,
            estimator_depth: 4,
            retention_buckets: 3,
            topk_depth: 5,
            ..CounterSettings::new(1000, 60)
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(settings().validate().is_ok());

        let bad = CounterSettings {
            window_width: 0,
            ..settings()
        };
        assert!(matches!(bad.validate(), Err(Error::Configuration(_))));

        let bad = CounterSettings {
            estimator_width_bits: 40,
            ..settings()
        };
        assert!(bad.validate().is_err());

        let bad = CounterSettings {
            retention_buckets: 0,
            ..settings()
        };
        assert!(CounterService::configure(bad).is_err());
    }

    #[test]
    fn test_ingest_and_count() {
        let service = CounterService::configure(settings()).unwrap();
        service.ingest_event(1005, "x", 3).unwrap();
        service.ingest_event(1050, "x", 2).unwrap();
        assert_eq!(service.count(1010, "x").unwrap(), 5);

        service.ingest_event(1065, "x", 7).unwrap();
        assert_eq!(service.count(1070, "x").unwrap(), 7);
        assert_eq!(service.count(1010, "x").unwrap(), 5);
    }

    #[test]
    fn test_rejected_event_leaves_no_trace() {
        let service = CounterService::configure(settings()).unwrap();
        assert!(service.ingest_event(999, "x", 3).is_err());

        let stats = service.stats();
        assert_eq!(stats.events_ingested, 0);
        assert_eq!(stats.events_rejected, 1);
        assert_eq!(stats.newest_estimator_bucket, None);

        service.rotate(1060);
        assert!(service.query_topk(1000).unwrap().is_empty());
    }

    #[test]
    fn test_rotation_history_length() {
        let service = CounterService::configure(settings()).unwrap();
        for n in 1..=5u64 {
            let rotation = service.rotate(1000 + 60 * n as i64);
            assert_eq!(rotation.finalized, n - 1);
            assert_eq!(rotation.opened, n);
            assert_eq!(service.retained_buckets(), (n as usize).min(3));

            let open_epoch = 1000 + 60 * n as i64 + 1;
            assert!(matches!(
                service.query_topk(open_epoch),
                Err(Error::OutOfRange { .. })
            ));
        }
        assert_eq!(service.open_bucket(), 5);
        assert_eq!(service.stats().rotations, 5);
    }

    #[test]
    fn test_rotation_snapshots_topk() {
        let service = CounterService::configure(settings()).unwrap();
        service.ingest_event(1001, "a", 1).unwrap();
        service.ingest_event(1002, "b", 4).unwrap();
        service.rotate(1060);
        service.ingest_event(1061, "c", 2).unwrap();
        service.rotate(1120);

        assert_eq!(service.query_topk(1030).unwrap(), vec!["b", "a"]);
        assert_eq!(service.query_topk(1100).unwrap(), vec!["c"]);
        assert_eq!(
            service.history(),
            vec![
                (0, vec!["b".to_string(), "a".to_string()]),
                (1, vec!["c".to_string()])
            ]
        );
    }

    #[test]
    fn test_heartbeat_before_anchor_still_rotates() {
        let service = CounterService::configure(settings()).unwrap();
        let rotation = service.rotate(10);
        assert_eq!(rotation.opened, 1);
        assert_eq!(service.stats().newest_estimator_bucket, None);
    }

    #[test]
    fn test_heartbeat_advances_estimator() {
        let service = CounterService::configure(settings()).unwrap();
        service.ingest_event(1001, "x", 1).unwrap();
        service.rotate(1185);
        assert_eq!(service.stats().newest_estimator_bucket, Some(3));
        assert_eq!(service.count(1185, "").unwrap(), 0);
    }
}
