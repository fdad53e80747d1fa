//! Prometheus metrics for the counting service
//!
//! Counters and gauges live in the default process registry and are rendered
//! by [`gather_metrics`] for the `/metrics` endpoint.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Encoder, Gauge,
    IntCounter, TextEncoder,
};

lazy_static! {
    /// Events accepted by ingestion
    pub static ref EVENTS_INGESTED: IntCounter = register_int_counter!(
        "hokud_events_ingested_total",
        "Total events accepted"
    ).unwrap();

    /// Events rejected by ingestion
    pub static ref EVENTS_REJECTED: CounterVec = register_counter_vec!(
        "hokud_events_rejected_total",
        "Total events rejected by reason",
        &["reason"]
    ).unwrap();

    /// Rotations performed
    pub static ref ROTATIONS_TOTAL: CounterVec = register_counter_vec!(
        "hokud_rotations_total",
        "Total window rotations by driver",
        &["driver"]
    ).unwrap();

    /// Replay records skipped
    pub static ref REPLAY_SKIPPED: IntCounter = register_int_counter!(
        "hokud_replay_records_skipped_total",
        "Total replay records skipped as malformed"
    ).unwrap();

    /// Queries served
    pub static ref QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "hokud_queries_total",
        "Total queries by kind and status",
        &["kind", "status"]
    ).unwrap();

    /// Finalized top-K buckets currently retained
    pub static ref RETAINED_BUCKETS: Gauge = register_gauge!(
        "hokud_retained_buckets",
        "Finalized top-K buckets currently retained"
    ).unwrap();

    /// Index of the open bucket
    pub static ref OPEN_BUCKET: Gauge = register_gauge!(
        "hokud_open_bucket",
        "Index of the bucket currently accepting top-K inserts"
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record an accepted event
#[inline]
pub fn record_ingest() {
    EVENTS_INGESTED.inc();
}

/// Record a rejected event
#[inline]
pub fn record_rejection(reason: &str) {
    EVENTS_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a rotation and the resulting bucket state
#[inline]
pub fn record_rotation(driver: &str, open_bucket: u64, retained: usize) {
    ROTATIONS_TOTAL.with_label_values(&[driver]).inc();
    OPEN_BUCKET.set(open_bucket as f64);
    RETAINED_BUCKETS.set(retained as f64);
}

/// Record a skipped replay record
#[inline]
pub fn record_replay_skip() {
    REPLAY_SKIPPED.inc();
}

/// Record a served query
#[inline]
pub fn record_query(kind: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    QUERIES_TOTAL.with_label_values(&[kind, status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rotation() {
        record_rotation("live", 3, 3);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("hokud_rotations_total"));
        assert!(metrics.contains("hokud_open_bucket"));
    }

    #[test]
    fn test_record_query() {
        record_query("counts", true);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("hokud_queries_total"));
    }
}
