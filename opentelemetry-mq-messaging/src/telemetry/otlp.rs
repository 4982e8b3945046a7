//! OTLP collector provider (Grafana, Jaeger, otel-collector, …).

use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

use super::TelemetryConfig;
use crate::error::Error;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Build a batching tracer provider exporting OTLP/gRPC spans to a collector.
///
/// The endpoint comes from the config override, then
/// `OTEL_EXPORTER_OTLP_ENDPOINT`, then the default local collector address.
pub fn provider(config: &TelemetryConfig) -> Result<SdkTracerProvider, Error> {
    let endpoint = config.endpoint.clone().unwrap_or_else(|| {
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
    });

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(Error::telemetry)?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(
            "service.version",
            config.service_version.clone(),
        ))
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}
