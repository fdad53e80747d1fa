//! Request and response types for the HTTP API

use crate::engine::ServiceStatsSnapshot;
use crate::types::{Epoch, Weight};
use serde::{Deserialize, Serialize};

/// Parameters for `/add`
///
/// Numeric fields are kept as strings so malformed values produce the
/// API's own error messages instead of a generic rejection.
#[derive(Debug, Default, Deserialize)]
pub struct AddParams {
    /// Key to count
    #[serde(default)]
    pub item: Option<String>,
    /// Weight (default 1)
    #[serde(default)]
    pub count: Option<String>,
    /// Unix timestamp (default or 0 = now)
    #[serde(default)]
    pub t: Option<String>,
}

impl AddParams {
    /// Fill fields missing here from `fallback`
    pub fn or(self, fallback: AddParams) -> AddParams {
        AddParams {
            item: self.item.or(fallback.item),
            count: self.count.or(fallback.count),
            t: self.t.or(fallback.t),
        }
    }
}

/// Parameters for `/query`
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    /// Key to look up
    #[serde(default)]
    pub q: Option<String>,
    /// First epoch (inclusive)
    #[serde(default)]
    pub start: Option<String>,
    /// Last epoch (inclusive)
    #[serde(default)]
    pub stop: Option<String>,
    /// `html` for a chart page, JSON otherwise
    #[serde(default)]
    pub format: Option<String>,
}

/// Parameters for `/topk`
#[derive(Debug, Default, Deserialize)]
pub struct TopKParams {
    /// Any epoch inside the requested window
    #[serde(default)]
    pub epoch: Option<String>,
}

/// Counts query response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// Key that was queried
    pub query: String,
    /// First epoch of the range
    pub start: Epoch,
    /// Seconds between consecutive counts
    pub step: i64,
    /// One estimate per window, chronological
    pub counts: Vec<Weight>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the server answers
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Counter state and totals
    #[serde(flatten)]
    pub service: ServiceStatsSnapshot,
    /// Name of the rotation driver in use
    pub driver: &'static str,
}
