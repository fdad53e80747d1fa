//! Error types for the counting service

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum Error {
    /// Timestamp is earlier than the anchor epoch
    #[error("Invalid epoch {epoch}: earlier than anchor epoch {anchor}")]
    InvalidEpoch {
        /// The rejected timestamp
        epoch: i64,
        /// The anchor epoch of bucket 0
        anchor: i64,
    },

    /// Malformed or out-of-domain event weight
    #[error("Invalid count: {0}")]
    InvalidCount(String),

    /// Range query bounds outside the valid domain
    #[error("Invalid range [{start}, {stop}] for anchor epoch {anchor}")]
    InvalidRange {
        /// Start epoch of the range
        start: i64,
        /// Stop epoch of the range
        stop: i64,
        /// The anchor epoch of bucket 0
        anchor: i64,
    },

    /// Top-K query for a bucket that is not in retained history
    #[error("Bucket {bucket} not retained (oldest {oldest}, {retained} retained)")]
    OutOfRange {
        /// Requested bucket index
        bucket: u64,
        /// Oldest retained bucket index
        oldest: u64,
        /// Number of finalized buckets currently retained
        retained: usize,
    },

    /// Replay record that could not be parsed
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// Line number in the record source (1-indexed)
        line: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// Replay record source could not be opened
    #[error("Record source {path:?} unavailable: {source}")]
    SourceUnavailable {
        /// Path of the record source
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by caller input rather than an internal fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidEpoch { .. }
                | Error::InvalidCount(_)
                | Error::InvalidRange { .. }
                | Error::MalformedRecord { .. }
        )
    }

    /// Whether the error means "no such bucket"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::OutOfRange { .. })
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidEpoch { .. } => "invalid_epoch",
            Error::InvalidCount(_) => "invalid_count",
            Error::InvalidRange { .. } => "invalid_range",
            Error::OutOfRange { .. } => "out_of_range",
            Error::MalformedRecord { .. } => "malformed_record",
            Error::SourceUnavailable { .. } => "source_unavailable",
            Error::Configuration(_) => "configuration",
            Error::Io(_) => "io",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
