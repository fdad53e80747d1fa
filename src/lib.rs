//! hokud - windowed approximate event counting
//!
//! This library provides a small in-memory counting service:
//! - Fixed-width time windows aligned to an anchor epoch
//! - Per-window frequency estimates from a rotating count-min sketch
//! - Per-window ranked top-K keys for finalized windows
//! - Live (wall-clock) or replay (log-driven) window rotation
//! - An HTTP API for ingestion and queries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod query;
pub mod sketch;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Window rotation drivers (live timer and log replay)
pub mod rotation;

/// HTTP API routes and handlers
pub mod server;

// Re-export main types
pub use engine::{CounterService, CounterSettings};
pub use error::{Error, Result};
pub use types::{Event, WindowGrid};
