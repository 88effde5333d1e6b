//! Prometheus metrics for banking-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use service_core::error::AppError;

/// Histogram for store operation duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "banking_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for per-connection sync outcomes.
pub static SYNC_ATTEMPTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "banking_sync_attempts_total",
        "Total number of connection sync attempts",
        &["outcome"]
    )
    .expect("Failed to register SYNC_ATTEMPTS")
});

/// Histogram for per-connection sync duration.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "banking_sync_duration_seconds",
        "Connection sync duration in seconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("Failed to register SYNC_DURATION")
});

/// Counter for ingested transactions.
pub static TRANSACTIONS_INGESTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "banking_transactions_ingested_total",
        "Total number of bank transactions seen during sync",
        &["result"]
    )
    .expect("Failed to register TRANSACTIONS_INGESTED")
});

/// Counter for auto-match results.
pub static AUTO_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "banking_auto_matches_total",
        "Total number of auto-match decisions",
        &["status"]
    )
    .expect("Failed to register AUTO_MATCHES")
});

/// Counter for manual and session operations.
pub static OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "banking_operations_total",
        "Total number of banking operations",
        &["operation", "status"]
    )
    .expect("Failed to register OPERATIONS")
});

/// Counter for raised alerts.
pub static ALERTS_RAISED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "banking_alerts_raised_total",
        "Total number of alerts raised",
        &["alert_type", "priority"]
    )
    .expect("Failed to register ALERTS_RAISED")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&SYNC_ATTEMPTS);
    Lazy::force(&SYNC_DURATION);
    Lazy::force(&TRANSACTIONS_INGESTED);
    Lazy::force(&AUTO_MATCHES);
    Lazy::force(&OPERATIONS);
    Lazy::force(&ALERTS_RAISED);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record the outcome and duration of one connection sync.
pub fn record_sync(outcome: &str, duration_secs: f64) {
    SYNC_ATTEMPTS.with_label_values(&[outcome]).inc();
    SYNC_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

pub fn record_ingested(inserted: usize, skipped: usize) {
    TRANSACTIONS_INGESTED
        .with_label_values(&["inserted"])
        .inc_by(inserted as f64);
    TRANSACTIONS_INGESTED
        .with_label_values(&["duplicate"])
        .inc_by(skipped as f64);
}

pub fn record_auto_match(status: &str) {
    AUTO_MATCHES.with_label_values(&[status]).inc();
}

/// Record a manual or session operation, labelled with the error kind on failure.
pub fn record_operation<T>(operation: &str, result: &Result<T, AppError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    OPERATIONS.with_label_values(&[operation, status]).inc();
}

pub fn record_alert(alert_type: &str, priority: &str) {
    ALERTS_RAISED.with_label_values(&[alert_type, priority]).inc();
}
