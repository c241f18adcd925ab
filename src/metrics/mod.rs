// Metrics module for Prometheus observability

mod registry;

pub use registry::{
    gather_metrics, CACHE_ENTRIES, CACHE_OPERATIONS, GRADING_CASES, GRADING_DURATION,
    GRADING_REQUESTS, REQUESTS_TOTAL, REQUEST_DURATION,
};

/// Helper to record request metrics
pub fn record_request(method: &str, endpoint: &str, status_code: u16, duration_secs: f64) {
    REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status_code.to_string()])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

/// Helper to record asset cache operations
pub fn record_cache_event(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn update_cache_entries(version: &str, count: usize) {
    CACHE_ENTRIES.with_label_values(&[version]).set(count as f64);
}

/// Helper to record one graded submission
pub fn record_grading(compiled: bool, passed: usize, total: usize, duration_secs: f64) {
    let outcome = if compiled { "graded" } else { "compile_error" };
    GRADING_REQUESTS.with_label_values(&[outcome]).inc();
    GRADING_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);

    if passed > 0 {
        GRADING_CASES
            .with_label_values(&["passed"])
            .inc_by(passed as f64);
    }
    if total > passed {
        GRADING_CASES
            .with_label_values(&["failed"])
            .inc_by((total - passed) as f64);
    }
}
