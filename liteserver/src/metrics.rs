//! Instrumentation points for the lite-query dispatcher (§4.9), following
//! the teacher's per-crate `metrics.rs` convention.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter, IntCounterVec};

pub static QUERIES_HANDLED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_liteserver_queries_handled_total", "handle_with_deadline calls that returned a response")
        .unwrap()
});

pub static QUERIES_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "archive_liteserver_queries_failed_total",
        "Queries that returned an error, by wire error kind",
        &["kind"]
    )
    .unwrap()
});

pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_liteserver_cache_hits_total", "Queries served from the response cache").unwrap()
});

pub static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "archive_liteserver_query_duration_seconds",
        "Wall time of one dispatched query, from cache check to response"
    )
    .unwrap()
});
