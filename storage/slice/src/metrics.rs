//! Instrumentation points for one archive slice (§4.4), following the
//! teacher's per-crate `metrics.rs` convention.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

pub static PACKAGE_APPEND_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "archive_slice_package_append_duration_seconds",
        "Wall time of one add_file package append, including the sub-slice selection"
    )
    .unwrap()
});

pub static FILES_APPENDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_slice_files_appended_total", "add_file calls that appended a new record").unwrap()
});

pub static HANDLES_ADDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_slice_handles_added_total", "add_handle calls that registered a new entry").unwrap()
});
