//! Tracing and OpenTelemetry setup.
//!
//! Installs a tracing-subscriber with an `EnvFilter` and fmt output. When an
//! OTLP endpoint is configured, traces, metrics and logs are also exported
//! over gRPC.

pub mod consumer;
pub mod metrics;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
    /// Filter directives used when `RUST_LOG` is not set.
    pub default_filter: String,
}

struct OtlpProviders {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

/// Keeps OTLP exporters alive; flushes and shuts them down on drop.
///
/// Hold it for as long as the process should export telemetry.
pub struct TelemetryGuard {
    otlp: Option<OtlpProviders>,
}

impl TelemetryGuard {
    /// Whether signals are exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.otlp.is_some()
    }

    /// Push buffered spans, metrics and logs to the exporters.
    pub fn force_flush(&self) {
        if let Some(otlp) = &self.otlp {
            let _ = otlp.tracer.force_flush();
            let _ = otlp.meter.force_flush();
            let _ = otlp.logger.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // Reverse of setup order.
        if let Some(otlp) = self.otlp.take() {
            let _ = otlp.logger.shutdown();
            let _ = otlp.meter.shutdown();
            let _ = otlp.tracer.shutdown();
        }
    }
}

fn otlp_providers(endpoint: &str, service_name: String) -> Result<OtlpProviders> {
    use opentelemetry_otlp::WithExportConfig as _;

    let resource = Resource::builder().with_service_name(service_name).build();

    let spans = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP span exporter: {e}")))?;
    let tracer = SdkTracerProvider::builder()
        .with_batch_exporter(spans)
        .with_resource(resource.clone())
        .build();

    let metrics = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP metric exporter: {e}")))?;
    let meter = SdkMeterProvider::builder()
        .with_periodic_exporter(metrics)
        .with_resource(resource.clone())
        .build();

    let logs = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP log exporter: {e}")))?;
    let logger = SdkLoggerProvider::builder()
        .with_batch_exporter(logs)
        .with_resource(resource)
        .build();

    Ok(OtlpProviders {
        tracer,
        meter,
        logger,
    })
}

/// Install the global tracing subscriber and, if configured, OTLP export.
///
/// # Errors
///
/// Returns an error if an OTLP exporter fails to build or a global
/// subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let Some(endpoint) = config.endpoint else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { otlp: None });
    };

    let otlp = otlp_providers(&endpoint, config.service_name)?;
    opentelemetry::global::set_meter_provider(otlp.meter.clone());

    let trace_layer =
        tracing_opentelemetry::layer().with_tracer(otlp.tracer.tracer("pubsub-consumer"));
    let log_layer =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&otlp.logger);

    registry
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { otlp: Some(otlp) })
}
