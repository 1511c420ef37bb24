//! Instrumentation points for the cell store (§4.2), following the
//! teacher's per-crate `metrics.rs` convention (`core/store`, `nearcore`).
//! No exporter wiring lives here — that belongs to `archive-node` — just
//! the counters/histograms a store instance updates as it works.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

pub static CELLS_STORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_cells_stored_total", "Cells newly persisted by store_cell, across all roots")
        .unwrap()
});

pub static ROOTS_STORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_cells_roots_stored_total", "store_cell calls that created a new root")
        .unwrap()
});

pub static ROOTS_GC_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("archive_cells_roots_gc_removed_total", "Root-list entries reclaimed by gc_step")
        .unwrap()
});

pub static STORE_CELL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "archive_cells_store_cell_duration_seconds",
        "Wall time of one store_cell call, including its refcount DFS"
    )
    .unwrap()
});
