//! Prometheus metrics for the metering engine

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter, TextEncoder,
};

lazy_static! {
    /// Spend attempts by outcome (success / insufficient / already_processed / not_found)
    pub static ref SPEND_TOTAL: CounterVec = register_counter_vec!(
        "ledger_spend_total",
        "Spend attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Spend latency, end to end on the hot path
    pub static ref SPEND_DURATION: Histogram = register_histogram!(
        "ledger_spend_duration_seconds",
        "Spend latency in seconds",
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]
    )
    .unwrap();

    /// Spend events published to the bus, by status
    pub static ref EVENTS_PUBLISHED_TOTAL: CounterVec = register_counter_vec!(
        "ledger_events_published_total",
        "Spend events published to the bus",
        &["status"]
    )
    .unwrap();

    /// Events dropped by the rpc bus producer buffer
    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "ledger_bus_events_dropped_total",
        "Events dropped because the producer buffer was full"
    )
    .unwrap();

    /// Spend events folded into Postgres by the worker, by result
    pub static ref EVENTS_APPLIED_TOTAL: CounterVec = register_counter_vec!(
        "ledger_worker_events_total",
        "Spend events processed by the sync worker",
        &["result"]
    )
    .unwrap();

    /// Cold-start warm-ups from Postgres into Redis
    pub static ref CACHE_WARMUPS_TOTAL: IntCounter = register_int_counter!(
        "ledger_cache_warmups_total",
        "Balance warm-ups from the durable store"
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn metrics_handler() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render() {
        SPEND_TOTAL.with_label_values(&["success"]).inc();
        EVENTS_DROPPED_TOTAL.inc();

        let body = metrics_handler().unwrap();
        assert!(body.contains("ledger_spend_total"));
        assert!(body.contains("ledger_bus_events_dropped_total"));
    }
}
