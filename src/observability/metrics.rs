//! Metrics collection.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by server, status
//! - `switchyard_request_duration_seconds` (histogram): latency by server
//! - `switchyard_config_reloads_total` (counter): reloads by result
//! - `switchyard_cleanup_failures_total` (counter): failed cleanups during teardown
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is up to the embedder
//! - Label values are low-cardinality (server names, status codes)

use std::time::Instant;

pub fn record_request(server: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "switchyard_requests_total",
        "server" => server.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "switchyard_request_duration_seconds",
        "server" => server.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// `result` is `"success"` or `"failure"`.
pub fn record_reload(result: &'static str) {
    ::metrics::counter!("switchyard_config_reloads_total", "result" => result).increment(1);
}

pub fn record_cleanup_failures(count: usize) {
    if count > 0 {
        ::metrics::counter!("switchyard_cleanup_failures_total").increment(count as u64);
    }
}
