//! Process-wide telemetry wiring: tracer provider, propagator, and log
//! subscriber.
//!
//! [`init`] is meant to be called exactly once at startup and returns an
//! explicit [`Telemetry`] handle owning the tracer provider; shutdown goes
//! through the handle rather than a hidden global. Two provider backends are
//! available: the Datadog Agent's OTLP intake ([`datadog`]) and a plain OTLP
//! collector ([`otlp`]).

pub mod datadog;
pub mod otlp;

use std::str::FromStr;

use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::{TraceContextExt, TracerProvider as _};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::Error;

/// Which span exporter backend to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Plain OTLP collector (Grafana, Jaeger, the otel-collector, …).
    #[default]
    Otlp,
    /// Datadog Agent OTLP intake.
    Datadog,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "otlp" => Ok(Backend::Otlp),
            "datadog" => Ok(Backend::Datadog),
            other => Err(Error::telemetry(format!("unknown trace backend: {other}"))),
        }
    }
}

/// Service identity and exporter settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub backend: Backend,
    /// Exporter endpoint override; each backend has its own env-var and
    /// default fallback.
    pub endpoint: Option<String>,
    /// Emit logs as JSON instead of the human-readable format.
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        TelemetryConfig {
            service_name: service_name.into(),
            service_version: service_version.into(),
            backend: Backend::default(),
            endpoint: None,
            json_logs: false,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }
}

/// Handle owning the tracer provider set up by [`init`].
pub struct Telemetry {
    provider: SdkTracerProvider,
}

impl Telemetry {
    /// Flush buffered spans and shut the provider down.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.provider.force_flush().map_err(Error::telemetry)?;
        self.provider.shutdown().map_err(Error::telemetry)
    }
}

/// Set up the tracer provider, the W3C TraceContext + Baggage propagator, and
/// a `tracing` subscriber with an OpenTelemetry layer.
///
/// Call once at startup; a second call fails because the subscriber is
/// already installed. The log filter honors `RUST_LOG` and defaults to
/// `info`.
pub fn init(config: TelemetryConfig) -> Result<Telemetry, Error> {
    let provider = match config.backend {
        Backend::Otlp => otlp::provider(&config)?,
        Backend::Datadog => datadog::provider(&config)?,
    };

    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer(config.service_name.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(Error::telemetry)?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(Error::telemetry)?;
    }

    Ok(Telemetry { provider })
}

/// Trace context of the active `tracing` span, for stamping outbound
/// messages.
pub fn current_context() -> opentelemetry::Context {
    tracing::Span::current().context()
}

/// Trace and span ids of the active span, for log/trace correlation fields
/// (`dd.trace_id` / `dd.span_id` style). Returns `None` outside of a sampled
/// span.
pub fn trace_ids() -> Option<(String, String)> {
    let cx = tracing::Span::current().context();
    let span = cx.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        Some((
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        ))
    } else {
        None
    }
}
