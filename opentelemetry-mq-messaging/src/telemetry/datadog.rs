//! Datadog provider, exporting through the Datadog Agent's OTLP intake.

use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

use super::TelemetryConfig;
use crate::error::Error;

const DEFAULT_AGENT_ENDPOINT: &str = "http://127.0.0.1:4317";

/// Build a batching tracer provider pointed at the Datadog Agent.
///
/// The endpoint comes from the config override, then `DD_TRACE_AGENT_URL`,
/// then the default local agent address. `DD_ENV`, when set, is mapped onto
/// the `deployment.environment` resource attribute so the agent tags traces
/// with the environment.
pub fn provider(config: &TelemetryConfig) -> Result<SdkTracerProvider, Error> {
    let endpoint = config.endpoint.clone().unwrap_or_else(|| {
        std::env::var("DD_TRACE_AGENT_URL").unwrap_or_else(|_| DEFAULT_AGENT_ENDPOINT.to_string())
    });

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(Error::telemetry)?;

    let mut resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(
            "service.version",
            config.service_version.clone(),
        ));
    if let Ok(environment) = std::env::var("DD_ENV") {
        resource = resource.with_attribute(KeyValue::new("deployment.environment", environment));
    }

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource.build())
        .build())
}
