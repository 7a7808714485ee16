use opentelemetry::{global, trace::TracerProvider, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{logs::SdkLoggerProvider, trace::SdkTracerProvider, Resource};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const SERVICE_NAME: &str = "quotesayaka";

/// providers that have to be flushed before the process exits.
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    log_provider: SdkLoggerProvider,
}

impl Telemetry {
    pub fn shutdown(self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            tracing::warn!(err = ?e, "an error occurred when shutting down tracer provider");
        }

        if let Err(e) = self.log_provider.shutdown() {
            tracing::warn!(err = ?e, "an error occurred when shutting down logger provider");
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// set up logging to stdout, plus OTLP export of spans and logs when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_telemetry() -> anyhow::Result<Option<Telemetry>> {
    let Ok(otlp_endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        Registry::default()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        tracing::info!("no OTLP endpoint configured, logging to stdout only");
        return Ok(None);
    };

    let service_name = env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| SERVICE_NAME.to_string());

    let service_version =
        env::var("OTEL_SERVICE_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new("service.version", service_version))
        .build();

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()?;

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(span_exporter)
        .build();

    let log_provider = SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(log_exporter)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer(SERVICE_NAME);
    let tracer_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let logger_layer = OpenTelemetryTracingBridge::new(&log_provider);

    Registry::default()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(tracer_layer)
        .with(logger_layer)
        .try_init()?;

    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry initialized successfully");

    Ok(Some(Telemetry {
        tracer_provider,
        log_provider,
    }))
}
