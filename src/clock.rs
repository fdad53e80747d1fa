//! Wall-clock source
//!
//! The live rotation driver and the ingestion front door read "now" through
//! [`Clock`] so tests can substitute a deterministic time source.

use crate::types::Epoch;

/// Source of the current Unix time in seconds
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds
    fn now(&self) -> Epoch;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Epoch {
        chrono::Utc::now().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
