// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the engine.
//!
//! Uses `lazy_static` so metrics are registered exactly once for the
//! process lifetime.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};

lazy_static! {
    /// Total decision requests handled, labeled by mode (`request`/`inquire`)
    /// and outcome (`go_ahead`/`denied`/`unknown_host`).
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "goahead_decisions_total",
        "Total number of decide() calls, labeled by mode and outcome.",
        &["mode", "outcome"]
    )
    .unwrap();

    /// Currently restarting hosts per cluster.
    pub static ref ONGOING_RESTARTS: GaugeVec = register_gauge_vec!(
        "goahead_ongoing_restarts",
        "Current count of hosts restarting, labeled by cluster.",
        &["cluster"]
    )
    .unwrap();

    /// Sleeping completion watchers awaiting their offset timeout or a
    /// hand-off, process-wide.
    pub static ref SLEEPING_WATCHERS: Gauge = register_gauge!(
        "goahead_sleeping_watchers",
        "Number of completion watchers currently in their offset sleep."
    )
    .unwrap();

    /// Completion watchers that have finished (reached N consecutive
    /// successful checks) since startup.
    pub static ref COMPLETIONS_TOTAL: Counter = register_counter!(
        "goahead_completions_total",
        "Total number of completion watchers that reached their success threshold."
    )
    .unwrap();

    /// Hand-offs performed by the inquire coordinator since startup.
    pub static ref HAND_OFFS_TOTAL: Counter = register_counter!(
        "goahead_hand_offs_total",
        "Total number of sleeping watchers interrupted via inquire hand-off."
    )
    .unwrap();

    /// Latency of individual command-runner (`C3`) invocations.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram = register_histogram!(
        "goahead_command_latency_seconds",
        "Latency of templated shell command execution, in seconds."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text
/// exposition format for the `/metrics` endpoint.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
