//! Crate-specific metrics functionality.
//!
//! Re-exports the `metrics` crate so call sites can `use crate::metrics;`
//! and get both the `counter!`/`gauge!`/`histogram!` macros and this
//! crate's metric name constants from one place.

pub use metrics::*;

/// Registers every metric this crate emits. Call once at startup, after
/// [`crate::telemetry::Config::try_init`] has installed a recorder.
pub fn register_metrics() {
    register_counter!(FAILED_SENDS);
    describe_counter!(
        FAILED_SENDS,
        Unit::Count,
        "Number of output-queue enqueue attempts that failed for a client"
    );

    register_counter!(EVENTS_MISSED_INTERNAL);
    describe_counter!(
        EVENTS_MISSED_INTERNAL,
        Unit::Count,
        "Number of events the event-bus transport reported dropping before delivery"
    );

    register_counter!(EVENTS_MISSED_BY_SLOW_RECEIVER);
    describe_counter!(
        EVENTS_MISSED_BY_SLOW_RECEIVER,
        Unit::Count,
        "Number of events or notifications dropped because the output queue was full"
    );

    register_gauge!(QUEUE_BYTES_IN_FLIGHT);
    describe_gauge!(
        QUEUE_BYTES_IN_FLIGHT,
        Unit::Bytes,
        "Cumulative protobuf-encoded size of values currently queued for a subscription"
    );

    register_histogram!(SEND_LATENCY);
    describe_histogram!(
        SEND_LATENCY,
        Unit::Seconds,
        "Time between a value being enqueued and the consumer acknowledging it"
    );
}

pub const HISTOGRAM_BUCKETS: &[f64; 5] = &[0.0001, 0.001, 0.01, 0.1, 1.0];

pub const FAILED_SENDS: &str = "telemetry_client_core_failed_sends";
pub const EVENTS_MISSED_INTERNAL: &str = "telemetry_client_core_events_missed_internal";
pub const EVENTS_MISSED_BY_SLOW_RECEIVER: &str = "telemetry_client_core_events_missed_by_slow_receiver";
pub const QUEUE_BYTES_IN_FLIGHT: &str = "telemetry_client_core_queue_bytes_in_flight";
pub const SEND_LATENCY: &str = "telemetry_client_core_send_latency";
