//! HTTP handlers
//!
//! Thin translation between query-string (or form) requests and [`CounterService`]
//! calls. Validation failures are answered with plain-text 400s, a top-K
//! request for a window outside retained history with a 404.

use super::types::*;
use super::AppState;
use crate::engine::CounterService;
use crate::error::Error;
use crate::types::{Epoch, Weight};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Plain-text error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, format!("{}\n", self.message)).into_response()
    }
}

/// Parse an optional integer parameter, falling back to `default` when absent
fn int_param(value: Option<&str>, default: i64) -> Result<i64, std::num::ParseIntError> {
    match value {
        None | Some("") => Ok(default),
        Some(v) => v.parse(),
    }
}

fn parse_count(value: Option<&str>) -> Result<Weight, Error> {
    let count = int_param(value, 1).map_err(|e| Error::InvalidCount(e.to_string()))?;
    Weight::try_from(count).map_err(|_| Error::InvalidCount(format!("{} out of range", count)))
}

/// Parse a required epoch bound; 0, missing and pre-anchor values are rejected
fn parse_bound(value: Option<&str>, service: &CounterService) -> Option<Epoch> {
    match int_param(value, 0) {
        Ok(epoch) if epoch != 0 && epoch >= service.anchor_epoch() => Some(epoch),
        _ => None,
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Count one event
///
/// Parameters come from the query string or a form-encoded body; body
/// fields win when both are present.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AddParams>,
    form: Option<Form<AddParams>>,
) -> Result<String, ApiError> {
    let params = match form {
        Some(Form(body)) => body.or(query),
        None => query,
    };

    let count = parse_count(params.count.as_deref()).map_err(|e| {
        crate::metrics::record_rejection(e.kind());
        ApiError::bad_request("bad count")
    })?;

    let epoch = match int_param(params.t.as_deref(), 0) {
        Ok(0) => state.clock.now(),
        Ok(epoch) => epoch,
        Err(_) => {
            crate::metrics::record_rejection("invalid_epoch");
            return Err(ApiError::bad_request("bad epoch"));
        },
    };

    let item = params.item.unwrap_or_default();
    match state.service.ingest_event(epoch, &item, count) {
        Ok(_) => Ok(format!("Ok {}\n", epoch)),
        Err(Error::InvalidEpoch { .. }) => Err(ApiError::bad_request("bad epoch")),
        Err(e) => {
            warn!(error = %e, "Ingestion failed");
            Err(e.into())
        },
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Counts for a key over a range of windows
pub async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let service = &state.service;
    let start = parse_bound(params.start.as_deref(), service)
        .ok_or_else(|| ApiError::bad_request("bad start epoch"))?;
    let stop = parse_bound(params.stop.as_deref(), service)
        .ok_or_else(|| ApiError::bad_request("bad stop epoch"))?;

    let key = params.q.unwrap_or_default();
    let counts = service.query_counts(&key, start, stop)?;
    debug!(key = %key, start, stop, buckets = counts.len(), "Counts query");

    let response = QueryResponse {
        query: key,
        start,
        step: service.window_width(),
        counts,
    };

    if params.format.as_deref() == Some("html") {
        return Ok(Html(render_chart(&response)).into_response());
    }
    Ok(Json(response).into_response())
}

/// Ranked keys for the window containing an epoch
pub async fn topk(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopKParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let epoch = match int_param(params.epoch.as_deref(), -1) {
        Ok(epoch) if epoch >= 0 && epoch >= state.service.anchor_epoch() => epoch,
        _ => return Err(ApiError::bad_request("bad epoch")),
    };

    match state.service.query_topk(epoch) {
        Ok(keys) => Ok(Json(keys)),
        Err(e) if e.is_not_found() => Err(ApiError::not_found(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Health & Stats
// =============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Service statistics
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        service: state.service.stats(),
        driver: state.driver,
    })
}

/// Prometheus metrics endpoint
pub async fn metrics() -> Response {
    match crate::metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, [("content-type", "text/plain")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e).into_response(),
    }
}

// =============================================================================
// HTML rendering
// =============================================================================

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Time-series chart page for a counts query
fn render_chart(response: &QueryResponse) -> String {
    let counts = serde_json::to_string(&response.counts).unwrap_or_else(|_| "[]".to_string());
    format!(
        r##"<html>
<head><title>{title}</title></head>
<script src="//cdnjs.cloudflare.com/ajax/libs/jquery/2.0.3/jquery.min.js"></script>
<script src="//cdnjs.cloudflare.com/ajax/libs/flot/0.8.2/jquery.flot.min.js"></script>
<script src="//cdnjs.cloudflare.com/ajax/libs/flot/0.8.2/jquery.flot.time.min.js"></script>
<script type="text/javascript">
    var counts = {counts};
    var data = [];
    for (var i = 0; i < counts.length; i++) {{ data[i] = [({start} + i * {step}) * 1000, counts[i]]; }}
    $(document).ready(function() {{
        $.plot($("#placeholder"), [data], {{ xaxis: {{ mode: "time" }} }});
    }});
</script>
<body>
<div id="placeholder" style="width:1200px; height:400px"></div>
</body>
</html>
"##,
        title = escape_html(&response.query),
        counts = counts,
        start = response.start,
        step = response.step,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_param() {
        assert_eq!(int_param(None, 1).unwrap(), 1);
        assert_eq!(int_param(Some(""), 1).unwrap(), 1);
        assert_eq!(int_param(Some("42"), 1).unwrap(), 42);
        assert!(int_param(Some("4x"), 1).is_err());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(None).unwrap(), 1);
        assert_eq!(parse_count(Some("7")).unwrap(), 7);
        assert!(matches!(parse_count(Some("-1")), Err(Error::InvalidCount(_))));
        assert!(matches!(parse_count(Some("x")), Err(Error::InvalidCount(_))));
        assert!(parse_count(Some("5000000000")).is_err());
    }

    #[test]
    fn test_render_chart_escapes_key() {
        let page = render_chart(&QueryResponse {
            query: "<script>".to_string(),
            start: 1000,
            step: 60,
            counts: vec![1, 2],
        });
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("var counts = [1,2];"));
    }
}
