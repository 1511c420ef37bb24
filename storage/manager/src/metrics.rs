//! Instrumentation points for the archive manager (§4.5), following the
//! teacher's per-crate `metrics.rs` convention.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

pub static GC_SLICES_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "archive_manager_gc_slices_deleted_total",
        "Slices destroyed by run_gc, by catalog (perm/key/temp)",
        &["kind"]
    )
    .unwrap()
});

pub static HANDLES_ROUTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_manager_handles_routed_total", "add_handle calls routed to a slice").unwrap()
});

pub static SLICES_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_manager_slices_opened_total", "Slices opened on demand via get_or_create").unwrap()
});
