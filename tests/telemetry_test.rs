//! Integration tests for telemetry initialization and span helpers.

#[test]
fn telemetry_initializes_without_endpoint() {
    let config = pubsub_consumer::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "pubsub-test".to_string(),
        default_filter: "debug".to_string(),
    };
    // Err when another test in this binary installed the global subscriber.
    if let Ok(guard) = pubsub_consumer::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn consume_span_records_message() {
    let span = pubsub_consumer::telemetry::consumer::start_consume_span("consumer-1", "default");
    pubsub_consumer::telemetry::consumer::record_message(&span, "1700000000000-0");
}

#[test]
fn result_span_records_outcome() {
    let span =
        pubsub_consumer::telemetry::consumer::start_result_span("consumer-1", "1700000000000-0");
    pubsub_consumer::telemetry::consumer::record_outcome(&span, "duplicate");
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;
    pubsub_consumer::telemetry::metrics::heartbeats().add(1, &[KeyValue::new("result", "ok")]);
    pubsub_consumer::telemetry::metrics::reads().add(1, &[KeyValue::new("result", "empty")]);
    pubsub_consumer::telemetry::metrics::results().add(1, &[KeyValue::new("result", "ok")]);
    pubsub_consumer::telemetry::metrics::acks().add(1, &[KeyValue::new("result", "ok")]);
}
