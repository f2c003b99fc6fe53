//! Consumer span helpers.
//!
//! Spans wrap the foreground consumer calls so that reads and result
//! publication show up per consumer and per message.

use tracing::Span;

/// Start a span for a consumer-group read.
///
/// The `message.id` field is declared empty and filled in by
/// [`record_message`] once an entry is delivered.
pub fn start_consume_span(consumer_id: &str, stream: &str) -> Span {
    tracing::info_span!(
        "pubsub.consume",
        "consumer.id" = consumer_id,
        "stream" = stream,
        "message.id" = tracing::field::Empty,
    )
}

/// Start a span for publishing the result of a message.
pub fn start_result_span(consumer_id: &str, message_id: &str) -> Span {
    tracing::info_span!(
        "pubsub.set_result",
        "consumer.id" = consumer_id,
        "message.id" = message_id,
        "outcome" = tracing::field::Empty,
    )
}

/// Record the delivered message id on a consume span.
pub fn record_message(span: &Span, message_id: &str) {
    span.record("message.id", message_id);
}

/// Record how a result publication ended.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("outcome", outcome);
}
