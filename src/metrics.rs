//! Optional Prometheus metrics, enabled by the `metrics` feature.
//!
//! Grounded on `sov_schema_db::metrics`'s `Lazy`-registered static pattern.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

/// Number of objects created, labeled by object type storage id (as a string).
pub static OBJECTS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("permadb_objects_created_total", "Objects created", &["type_id"]).unwrap()
});

/// Number of objects deleted, labeled by object type storage id.
pub static OBJECTS_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("permadb_objects_deleted_total", "Objects deleted", &["type_id"]).unwrap()
});

/// Transaction commit latency in seconds, including validation.
pub static COMMIT_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "permadb_commit_latency_seconds",
        "Transaction commit latency in seconds, including validation",
        &["outcome"]
    )
    .unwrap()
});

/// Number of commit-time validation failures, labeled by failure kind.
pub static VALIDATION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "permadb_validation_failures_total",
        "Commit-time validation failures",
        &["kind"]
    )
    .unwrap()
});
