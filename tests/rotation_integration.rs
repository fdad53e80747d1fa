//! Rotation driver integration tests
//!
//! The same event stream is fed through the live driver (paused tokio time,
//! events submitted at their own timestamps) and through log replay. Both
//! must finalize identical top-K windows and answer identical counts.
//!
//! Only events strictly inside a window are used. An event submitted at the
//! exact instant a live rotation fires may land on either side of it, since
//! ingestion and rotation only share the accumulator lock.

use hokud::{
    clock::Clock,
    rotation::{spawn_driver, DriverStatus, LiveRotation, ReplayRotation, RotationDriver},
    types::Epoch,
    CounterService, CounterSettings, Error,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio::time::Instant;

const ANCHOR: i64 = 1000;
const WIDTH: i64 = 60;

const EVENTS: &[(i64, &str, u32)] = &[
    (1010, "apple", 3),
    (1020, "pear", 5),
    (1070, "apple", 1),
    (1075, "fig", 2),
    (1130, "fig", 9),
    (1190, "pear", 1),
];

/// Wall clock that follows tokio's (possibly paused) time
struct TokioClock {
    origin: Epoch,
    start: Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> Epoch {
        self.origin + self.start.elapsed().as_secs() as i64
    }
}

fn service() -> Arc<CounterService> {
    let settings = CounterSettings {
        estimator_width_bits: 12,
        retention_buckets: 6,
        ..CounterSettings::new(ANCHOR, WIDTH)
    };
    Arc::new(CounterService::configure(settings).unwrap())
}

fn record_log() -> String {
    EVENTS
        .iter()
        .map(|(epoch, key, weight)| format!("{}\t{}\t{}\n", epoch, key, weight))
        .collect()
}

async fn run_live() -> Arc<CounterService> {
    let service = service();
    let start = Instant::now();
    let clock = Arc::new(TokioClock {
        origin: ANCHOR,
        start,
    });
    let driver: Arc<dyn RotationDriver> = Arc::new(LiveRotation::for_service(&service, clock));

    let (tx, rx) = broadcast::channel(1);
    let handle = spawn_driver(driver.clone(), service.clone(), rx);

    for &(epoch, key, weight) in EVENTS {
        tokio::time::sleep_until(start + Duration::from_secs((epoch - ANCHOR) as u64)).await;
        service.ingest_event(epoch, key, weight).unwrap();
    }

    tokio::time::sleep_until(start + Duration::from_secs(200)).await;
    tx.send(()).unwrap();
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.rotations, 3);
    assert_eq!(driver.status(), DriverStatus::Stopped);
    service
}

fn run_replay() -> Arc<CounterService> {
    let service = service();
    let report = hokud::rotation::replay_from(&service, Cursor::new(record_log()), 0).unwrap();
    assert_eq!(report.rotations, 3);
    assert_eq!(report.applied, EVENTS.len() as u64);
    service
}

#[tokio::test(start_paused = true)]
async fn test_live_and_replay_agree() {
    let live = run_live().await;
    let replay = run_replay();

    let expected = vec![
        (0, vec!["pear".to_string(), "apple".to_string()]),
        (1, vec!["fig".to_string(), "apple".to_string()]),
        (2, vec!["fig".to_string()]),
    ];
    assert_eq!(live.history(), expected);
    assert_eq!(replay.history(), expected);
    assert_eq!(live.open_bucket(), replay.open_bucket());

    for key in ["apple", "pear", "fig"] {
        let live_counts = live.query_counts(key, ANCHOR, 1180).unwrap();
        let replay_counts = replay.query_counts(key, ANCHOR, 1180).unwrap();
        assert_eq!(live_counts, replay_counts, "{}", key);
    }
    assert_eq!(live.query_counts("apple", ANCHOR, 1180).unwrap(), vec![3, 1, 0, 0]);

    for epoch in [1000, 1059, 1060, 1150] {
        assert_eq!(live.query_topk(epoch).unwrap(), replay.query_topk(epoch).unwrap());
    }
    assert!(matches!(live.query_topk(1190), Err(Error::OutOfRange { .. })));
    assert!(matches!(replay.query_topk(1190), Err(Error::OutOfRange { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_live_rotates_idle_windows() {
    let service = service();
    let clock = Arc::new(TokioClock {
        origin: ANCHOR,
        start: Instant::now(),
    });
    let driver = Arc::new(LiveRotation::for_service(&service, clock));
    let (tx, rx) = broadcast::channel(1);
    let handle = spawn_driver(driver, service.clone(), rx);

    // Ten idle windows
    tokio::time::sleep(Duration::from_secs(10 * 60 + 1)).await;
    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // Retention caps finalized history; the heartbeat moved the estimator
    let stats = service.stats();
    assert_eq!(stats.open_bucket, 10);
    assert_eq!(stats.retained_buckets, 6);
    assert_eq!(stats.newest_estimator_bucket, Some(10));
    assert!(matches!(
        service.query_topk(ANCHOR),
        Err(Error::OutOfRange { .. })
    ));
    assert_eq!(service.query_topk(ANCHOR + 9 * 60).unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_replay_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", record_log()).unwrap();
    writeln!(file, "garbage line").unwrap();
    writeln!(file, "1200\tlate").unwrap();

    let service = service();
    let driver = ReplayRotation::open(file.path()).unwrap();
    let (_tx, rx) = broadcast::channel(1);
    let report = driver.run(service.clone(), rx).await.unwrap();

    assert_eq!(report.lines, EVENTS.len() as u64 + 2);
    assert_eq!(report.applied, EVENTS.len() as u64 + 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.rotations, 3);
    assert_eq!(driver.status(), DriverStatus::Stopped);
    assert_eq!(service.count(1200, "late").unwrap(), 1);
}

#[test]
fn test_replay_missing_file() {
    let err = ReplayRotation::open("/nonexistent/hokud/records.tsv")
        .err()
        .unwrap();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
}

#[test]
fn test_replay_gap_collapses_to_one_rotation() {
    let service = service();
    let log = "1010\ta\n1500\tb\n1510\tc\n";
    let report = hokud::rotation::replay_from(&service, Cursor::new(log), 0).unwrap();

    assert_eq!(report.rotations, 1);
    assert_eq!(service.history(), vec![(0, vec!["a".to_string()])]);
    // The top-K bucket index no longer matches the timestamp after a gap
    assert_eq!(service.query_topk(1010).unwrap(), vec!["a"]);
    assert_eq!(service.count(1500, "b").unwrap(), 1);
}
