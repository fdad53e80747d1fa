//! Core data types used throughout the counting service
//!
//! # Key Types
//!
//! - **`Epoch`**: Unix timestamp in seconds
//! - **`BucketIndex`**: Offset of a fixed-width window from the anchor epoch
//! - **`WindowGrid`**: Anchor epoch plus window width; maps timestamps to buckets
//! - **`Event`**: A single weighted observation of a key
//!
//! # Example
//!
//! ```rust
//! use hokud::types::WindowGrid;
//!
//! let grid = WindowGrid::new(1000, 60).unwrap();
//! assert_eq!(grid.bucket_index(1005).unwrap(), 0);
//! assert_eq!(grid.bucket_index(1065).unwrap(), 1);
//! assert!(grid.bucket_index(999).is_err());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds
pub type Epoch = i64;

/// Index of a window counted from the anchor epoch (bucket 0)
pub type BucketIndex = u64;

/// Event weight
pub type Weight = u32;

/// Key reserved for heartbeat writes
///
/// Heartbeats are written with zero weight, so the key never gains a count.
pub const HEARTBEAT_KEY: &str = "";

/// Fixed mapping from timestamps to non-overlapping windows
///
/// Both fields are fixed for the lifetime of the process; all bucket
/// arithmetic is relative to `anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGrid {
    anchor: Epoch,
    width: i64,
}

impl WindowGrid {
    /// Create a window grid; the width must be positive
    pub fn new(anchor: Epoch, width: i64) -> Result<Self> {
        if width <= 0 {
            return Err(Error::Configuration(format!(
                "window width must be positive, got {}",
                width
            )));
        }
        Ok(Self { anchor, width })
    }

    /// Anchor epoch defining bucket 0
    pub fn anchor(&self) -> Epoch {
        self.anchor
    }

    /// Window width in seconds
    pub fn width(&self) -> i64 {
        self.width
    }

    /// Bucket containing `epoch`
    ///
    /// Fails with [`Error::InvalidEpoch`] for timestamps before the anchor.
    pub fn bucket_index(&self, epoch: Epoch) -> Result<BucketIndex> {
        if epoch < self.anchor {
            return Err(Error::InvalidEpoch {
                epoch,
                anchor: self.anchor,
            });
        }
        Ok(((epoch - self.anchor) / self.width) as BucketIndex)
    }

    /// First second covered by `bucket`
    pub fn bucket_start(&self, bucket: BucketIndex) -> Epoch {
        self.anchor
            .saturating_add((bucket as i64).saturating_mul(self.width))
    }
}

/// Round `now` down to the nearest multiple of `width`
///
/// Used as the anchor epoch when counting live traffic.
pub fn align_down(now: Epoch, width: i64) -> Epoch {
    now - now.rem_euclid(width)
}

/// A single weighted observation of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the key was seen
    pub epoch: Epoch,
    /// The key
    pub key: String,
    /// How many times it was seen
    pub weight: Weight,
}

impl Event {
    /// Create an event
    pub fn new(epoch: Epoch, key: impl Into<String>, weight: Weight) -> Self {
        Self {
            epoch,
            key: key.into(),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        let grid = WindowGrid::new(1000, 60).unwrap();
        assert_eq!(grid.bucket_index(1000).unwrap(), 0);
        assert_eq!(grid.bucket_index(1059).unwrap(), 0);
        assert_eq!(grid.bucket_index(1060).unwrap(), 1);
        assert_eq!(grid.bucket_index(1120).unwrap(), 2);
    }

    #[test]
    fn test_bucket_index_before_anchor() {
        let grid = WindowGrid::new(1000, 60).unwrap();
        let err = grid.bucket_index(999).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEpoch {
                epoch: 999,
                anchor: 1000
            }
        ));
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(WindowGrid::new(1000, 0).is_err());
        assert!(WindowGrid::new(1000, -5).is_err());
    }

    #[test]
    fn test_bucket_start() {
        let grid = WindowGrid::new(1000, 60).unwrap();
        assert_eq!(grid.bucket_start(0), 1000);
        assert_eq!(grid.bucket_start(2), 1120);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(1_700_000_123, 60), 1_700_000_100);
        assert_eq!(align_down(1_700_000_100, 60), 1_700_000_100);
        assert_eq!(align_down(59, 60), 0);
    }
}
