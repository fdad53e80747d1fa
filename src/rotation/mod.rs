//! Rotation drivers
//!
//! A rotation finalizes the open top-K bucket and opens the next one (see
//! [`CounterService::rotate`]). Two drivers decide *when* to rotate:
//!
//! - [`LiveRotation`]: fires every window width of real time
//! - [`ReplayRotation`]: fires when timestamps in a replayed log have advanced
//!   by at least one window width since the previous rotation
//!
//! Exactly one driver is selected at startup. Both call the same
//! `CounterService::rotate`, so a log sampled at the times the live driver
//! would see produces the same top-K history.

mod live;
mod replay;

pub use live::LiveRotation;
pub use replay::{parse_record, replay_from, ReplayClock, ReplayRotation, DEFAULT_PROGRESS_EVERY};

use crate::engine::CounterService;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Status of a rotation driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStatus {
    /// Driver has not started yet
    Starting,

    /// Driver is rotating
    Running,

    /// Driver finished (input exhausted or shutdown received)
    Stopped,

    /// Driver aborted with an error
    Failed(String),
}

impl DriverStatus {
    /// Check if the driver is running
    pub fn is_running(&self) -> bool {
        matches!(self, DriverStatus::Running)
    }

    /// Check if the driver has stopped (normally or due to failure)
    pub fn is_stopped(&self) -> bool {
        matches!(self, DriverStatus::Stopped | DriverStatus::Failed(_))
    }
}

/// What a driver did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverReport {
    /// Rotations fired
    pub rotations: u64,
    /// Input lines read (replay only)
    pub lines: u64,
    /// Records applied (replay only)
    pub applied: u64,
    /// Records skipped as malformed (replay only)
    pub skipped: u64,
}

/// Source of rotation signals
#[async_trait::async_trait]
pub trait RotationDriver: Send + Sync {
    /// Drive rotations on `service` until the input is exhausted or
    /// `shutdown` fires
    async fn run(
        &self,
        service: Arc<CounterService>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<DriverReport>;

    /// Driver name for logging and metrics
    fn name(&self) -> &'static str;

    /// Current status
    fn status(&self) -> DriverStatus;
}

/// Run `driver` on a background task
pub fn spawn_driver(
    driver: Arc<dyn RotationDriver>,
    service: Arc<CounterService>,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<Result<DriverReport>> {
    tokio::spawn(async move {
        let name = driver.name();
        let result = driver.run(service, shutdown).await;
        match &result {
            Ok(report) => tracing::debug!(driver = name, rotations = report.rotations, "Driver stopped"),
            Err(e) => tracing::error!(driver = name, error = %e, "Driver failed"),
        }
        result
    })
}
