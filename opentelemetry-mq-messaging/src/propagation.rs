//! Header-map carriers and envelope glue for trace-context propagation.
//!
//! These carriers adapt the plain `HashMap<String, String>` representation
//! used by the [`Envelope`](crate::Envelope) header to the OpenTelemetry
//! propagation API. Transport-specific carriers (AMQP header tables) live in
//! their transport modules.

use std::collections::HashMap;

use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::Context;

use crate::envelope::Envelope;

/// An [`Injector`] over a mutable string map.
///
/// Last write wins; keys are inserted or overwritten.
pub struct HeaderInjector<'a>(pub &'a mut HashMap<String, String>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// An [`Extractor`] over a string map.
pub struct HeaderExtractor<'a>(pub &'a HashMap<String, String>);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Inject the trace context of `cx` into `headers` using the globally
/// installed propagator.
///
/// A context with no active span leaves the map untouched.
pub fn inject_context(cx: &Context, headers: &mut HashMap<String, String>) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers));
    });
}

/// Extract a trace context from `headers`.
///
/// Absent or malformed fields yield a context with no parent span; this never
/// fails.
pub fn extract_context(headers: &HashMap<String, String>) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Write the trace context of `cx` into an envelope's header block before
/// publishing.
pub fn stamp_envelope<T>(cx: &Context, envelope: &mut Envelope<T>) {
    let mut headers = HashMap::new();
    inject_context(cx, &mut headers);
    envelope.set_trace_headers(headers);
}

/// Restore the trace context carried by an inbound envelope.
pub fn context_from_envelope<T>(envelope: &Envelope<T>) -> Context {
    extract_context(&envelope.trace_headers())
}
