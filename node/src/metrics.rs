//! Process-wide metrics for the daemon itself, plus the text-exposition
//! helper every `metrics.rs` in this workspace feeds into. No HTTP
//! exporter is wired up here (out of scope per §1/§6 — the daemon wrapper
//! is described only at its contract with the core); `encode` is exposed
//! so a surrounding process can serve it however it likes.

use once_cell::sync::Lazy;
use prometheus::{register_int_gauge, Encoder, IntGauge, TextEncoder};

pub static UPTIME_SECS: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("archive_node_uptime_seconds", "Seconds since this process started").unwrap());

pub static READY: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("archive_node_ready", "1 once the manager and keyring actors report ready, else 0").unwrap()
});

/// Renders every metric registered in the default registry (across every
/// crate's `metrics.rs`) in Prometheus text-exposition format.
pub fn encode() -> String {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf).expect("prometheus text encoding cannot fail");
    String::from_utf8(buf).expect("prometheus text encoding is always valid utf8")
}
