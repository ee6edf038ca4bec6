//! Metrics definitions for the recording service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rs_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the three served paths plus `/other`
//! - `status`: success, error, timeout
//! - `result`: hit, miss
//!
//! User ids and emails are never used as labels.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("rs_http_request".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000, 60.000,
                120.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Aggregation spans one upstream call per user, so it runs long
        .set_buckets_for_metric(
            Matcher::Prefix("rs_aggregation_duration".to_string()),
            &[
                0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000, 60.000, 120.000,
            ],
        )
        .map_err(|e| format!("Failed to set aggregation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `rs_http_requests_total`, `rs_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("rs_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("rs_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded label value.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/recordings" => "/api/v1/recordings",
        _ => "/other",
    }
}

// ============================================================================
// Aggregation Metrics
// ============================================================================

/// Record one fan-out aggregation.
///
/// Metric: `rs_aggregation_duration_seconds`, `rs_aggregation_users_total`,
/// `rs_aggregation_user_errors_total`
pub fn record_aggregation(users: usize, user_errors: usize, duration: Duration) {
    histogram!("rs_aggregation_duration_seconds").record(duration.as_secs_f64());
    counter!("rs_aggregation_users_total").increment(users as u64);
    counter!("rs_aggregation_user_errors_total").increment(user_errors as u64);
}

// ============================================================================
// Host Cache Metrics
// ============================================================================

/// Record host cache lookups.
///
/// Metric: `rs_host_cache_lookups_total`
/// Labels: `result` (hit, miss)
pub fn record_host_cache_lookups(hit: bool, count: usize) {
    if count == 0 {
        return;
    }
    let result = if hit { "hit" } else { "miss" };
    counter!("rs_host_cache_lookups_total", "result" => result).increment(count as u64);
}
