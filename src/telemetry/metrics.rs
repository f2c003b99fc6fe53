//! Metric instrument factories for pubsub-consumer.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"pubsub-consumer"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for pubsub-consumer instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("pubsub-consumer")
}

/// Counter: heartbeat writes.
/// Labels: `result` ("ok" | "error").
pub fn heartbeats() -> Counter<u64> {
    meter()
        .u64_counter("pubsub.consumer.heartbeats")
        .with_description("Number of heartbeat writes")
        .build()
}

/// Counter: consumer-group reads.
/// Labels: `stream`, `result` ("message" | "empty" | "error").
pub fn reads() -> Counter<u64> {
    meter()
        .u64_counter("pubsub.consumer.reads")
        .with_description("Number of consumer-group reads")
        .build()
}

/// Counter: result publications.
/// Labels: `stream`, `result` ("ok" | "duplicate" | "error").
pub fn results() -> Counter<u64> {
    meter()
        .u64_counter("pubsub.consumer.results")
        .with_description("Number of result publications")
        .build()
}

/// Counter: message acknowledgements.
/// Labels: `stream`, `result` ("ok" | "error").
pub fn acks() -> Counter<u64> {
    meter()
        .u64_counter("pubsub.consumer.acks")
        .with_description("Number of message acknowledgements")
        .build()
}
