//! Live rotation driver
//!
//! Sleeps one window width, writes a heartbeat at the current wall-clock
//! time and rotates, forever. Successive rotations may drift from exact
//! window boundaries; the period is fixed when the driver is built.

use super::{DriverReport, DriverStatus, RotationDriver};
use crate::clock::Clock;
use crate::engine::CounterService;
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wall-clock rotation driver
pub struct LiveRotation {
    period: Duration,
    clock: Arc<dyn Clock>,
    status: RwLock<DriverStatus>,
    rotations: AtomicU64,
}

impl LiveRotation {
    /// Rotate every `period`, reading "now" from `clock`
    pub fn new(period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            period,
            clock,
            status: RwLock::new(DriverStatus::Starting),
            rotations: AtomicU64::new(0),
        }
    }

    /// Rotate once per window of `service`
    pub fn for_service(service: &CounterService, clock: Arc<dyn Clock>) -> Self {
        Self::new(Duration::from_secs(service.window_width() as u64), clock)
    }

    /// Rotation period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Rotations fired so far
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl RotationDriver for LiveRotation {
    async fn run(
        &self,
        service: Arc<CounterService>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<DriverReport> {
        *self.status.write() = DriverStatus::Running;
        tracing::info!(
            period_secs = self.period.as_secs(),
            anchor_epoch = service.anchor_epoch(),
            "Live rotation started"
        );

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Live rotation received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Live rotation shutdown receiver lagged");
                        }
                    }
                }

                _ = tokio::time::sleep(self.period) => {
                    let rotation = service.rotate(self.clock.now());
                    self.rotations.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_rotation(self.name(), rotation.opened, rotation.retained);
                }
            }
        }

        *self.status.write() = DriverStatus::Stopped;
        Ok(DriverReport {
            rotations: self.rotations(),
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "live"
    }

    fn status(&self) -> DriverStatus {
        self.status.read().clone()
    }
}
