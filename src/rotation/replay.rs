//! Replay rotation driver
//!
//! Feeds an ordered log of tab-separated records into the service:
//!
//! ```text
//! <epoch>\t<key>[\t<count>]
//! ```
//!
//! "Now" is simulated from record timestamps. [`ReplayClock`] accumulates
//! forward timestamp steps and fires one rotation whenever at least one
//! window width has accumulated. A gap spanning several windows still fires
//! a single rotation, so the empty windows in between get no top-K bucket
//! of their own. Out-of-order and duplicate timestamps are applied but do
//! not move the clock.
//!
//! Malformed records are skipped and counted. Only failing to open the
//! source aborts a replay.

use super::{DriverReport, DriverStatus, RotationDriver};
use crate::engine::CounterService;
use crate::error::{Error, Result};
use crate::types::{Epoch, Event, Weight};
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Lines between progress log messages
pub const DEFAULT_PROGRESS_EVERY: u64 = 1 << 20;

/// Rotation timing simulated from record timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayClock {
    width: i64,
    max_epoch: Epoch,
    elapsed: i64,
}

impl ReplayClock {
    /// Start the clock at `anchor`
    pub fn new(anchor: Epoch, width: i64) -> Self {
        Self {
            width,
            max_epoch: anchor,
            elapsed: 0,
        }
    }

    /// Largest timestamp observed so far
    pub fn max_epoch(&self) -> Epoch {
        self.max_epoch
    }

    /// Observe a record timestamp; returns true if a rotation is due
    pub fn observe(&mut self, epoch: Epoch) -> bool {
        if epoch <= self.max_epoch {
            return false;
        }
        self.elapsed = self
            .elapsed
            .saturating_add(epoch.saturating_sub(self.max_epoch));
        self.max_epoch = epoch;
        if self.elapsed >= self.width {
            self.elapsed = 0;
            return true;
        }
        false
    }
}

/// Parse one record line
///
/// Returns the reason on failure. A missing count means 1.
pub fn parse_record(line: &str) -> std::result::Result<Event, String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = line.split('\t');

    let epoch_field = fields.next().unwrap_or_default();
    let epoch: Epoch = epoch_field
        .parse()
        .map_err(|_| format!("bad timestamp {:?}", epoch_field))?;

    let key = fields.next().ok_or_else(|| "missing key".to_string())?;

    let weight: Weight = match fields.next() {
        Some(count) => count
            .parse()
            .map_err(|e| format!("bad count {:?}: {}", count, e))?,
        None => 1,
    };

    if fields.next().is_some() {
        return Err("too many fields".to_string());
    }

    Ok(Event::new(epoch, key, weight))
}

/// Replay every record from `reader` into `service`
///
/// Runs to completion on the calling thread. IO errors other than invalid
/// UTF-8 abort the replay; everything else is skipped and counted.
pub fn replay_from<R: BufRead>(
    service: &CounterService,
    reader: R,
    progress_every: u64,
) -> Result<DriverReport> {
    let mut clock = ReplayClock::new(service.anchor_epoch(), service.window_width());
    let mut report = DriverReport::default();

    for line in reader.lines() {
        report.lines += 1;
        let line_no = report.lines as usize;

        if progress_every > 0 && report.lines % progress_every == 0 {
            info!(lines = report.lines, rotations = report.rotations, "Replay progress");
        }

        let parsed = match line {
            Ok(line) => parse_record(&line),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(e.to_string()),
            Err(e) => return Err(Error::Io(e)),
        };

        let event = match parsed {
            Ok(event) => event,
            Err(reason) => {
                skip(&mut report, Error::MalformedRecord { line: line_no, reason });
                continue;
            },
        };

        if clock.observe(event.epoch) {
            let rotation = service.rotate(clock.max_epoch());
            report.rotations += 1;
            crate::metrics::record_rotation("replay", rotation.opened, rotation.retained);
        }

        match service.ingest(&event) {
            Ok(_) => report.applied += 1,
            Err(e) => skip(
                &mut report,
                Error::MalformedRecord {
                    line: line_no,
                    reason: e.to_string(),
                },
            ),
        }
    }

    info!(
        lines = report.lines,
        applied = report.applied,
        skipped = report.skipped,
        rotations = report.rotations,
        "Replay complete"
    );
    Ok(report)
}

fn skip(report: &mut DriverReport, error: Error) {
    report.skipped += 1;
    crate::metrics::record_replay_skip();
    debug!(error = %error, "Skipping record");
}

/// Log replay rotation driver
pub struct ReplayRotation {
    source: Mutex<Option<Box<dyn BufRead + Send>>>,
    origin: PathBuf,
    progress_every: u64,
    status: RwLock<DriverStatus>,
}

impl ReplayRotation {
    /// Open a record file
    ///
    /// Fails with `SourceUnavailable` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), path))
    }

    /// Replay from an already-open reader; `origin` is used in logs
    pub fn from_reader(reader: impl BufRead + Send + 'static, origin: impl Into<PathBuf>) -> Self {
        Self {
            source: Mutex::new(Some(Box::new(reader))),
            origin: origin.into(),
            progress_every: DEFAULT_PROGRESS_EVERY,
            status: RwLock::new(DriverStatus::Starting),
        }
    }

    /// Log progress every `lines` lines (0 disables progress logs)
    pub fn with_progress_every(mut self, lines: u64) -> Self {
        self.progress_every = lines;
        self
    }
}

#[async_trait::async_trait]
impl RotationDriver for ReplayRotation {
    async fn run(
        &self,
        service: Arc<CounterService>,
        _shutdown: broadcast::Receiver<()>,
    ) -> Result<DriverReport> {
        let Some(reader) = self.source.lock().take() else {
            return Err(Error::Configuration(format!(
                "replay source {:?} already consumed",
                self.origin
            )));
        };

        *self.status.write() = DriverStatus::Running;
        info!(source = ?self.origin, anchor_epoch = service.anchor_epoch(), "Replay started");

        // Replay reads the whole source; keep it off the runtime workers
        let progress_every = self.progress_every;
        let result = tokio::task::spawn_blocking(move || {
            replay_from(&service, reader, progress_every)
        })
        .await
        .unwrap_or_else(|e| {
            Err(Error::Io(std::io::Error::new(
                ErrorKind::Other,
                format!("Replay task join error: {}", e),
            )))
        });
        *self.status.write() = match &result {
            Ok(_) => DriverStatus::Stopped,
            Err(e) => DriverStatus::Failed(e.to_string()),
        };
        result
    }

    fn name(&self) -> &'static str {
        "replay"
    }

    fn status(&self) -> DriverStatus {
        self.status.read().clone()
    }
}
