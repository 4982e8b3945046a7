//! AMQP header-table carriers for trace-context propagation.
//!
//! This module adapts `lapin`'s [`FieldTable`] to the OpenTelemetry
//! [`Injector`]/[`Extractor`] traits, plus helpers to stamp outbound message
//! properties and restore the context from an inbound delivery.

use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldTable};
use lapin::BasicProperties;
use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::Context;

/// An [`Injector`] over an AMQP header table.
///
/// Values are stored as long strings; last write wins.
pub struct FieldTableInjector<'a>(pub &'a mut FieldTable);

impl Injector for FieldTableInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0
            .insert(key.to_string().into(), AMQPValue::LongString(value.into()));
    }
}

/// An [`Extractor`] over an AMQP header table.
///
/// Non-string header values are ignored.
pub struct FieldTableExtractor<'a>(pub &'a FieldTable);

impl Extractor for FieldTableExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.inner().get(key).and_then(|value| match value {
            AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes()).ok(),
            _ => None,
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.0.inner().keys().map(|k| k.as_str()).collect()
    }
}

/// Inject the trace context of `cx` into outbound message properties,
/// creating the header table when the properties carry none.
pub fn with_trace_context(cx: &Context, properties: BasicProperties) -> BasicProperties {
    let mut headers = properties.headers().clone().unwrap_or_default();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut FieldTableInjector(&mut headers));
    });
    properties.with_headers(headers)
}

/// Restore the trace context carried by an inbound delivery.
///
/// A delivery without headers yields a context with no parent span.
pub fn context_from_delivery(delivery: &Delivery) -> Context {
    match delivery.properties.headers() {
        Some(headers) => global::get_text_map_propagator(|propagator| {
            propagator.extract(&FieldTableExtractor(headers))
        }),
        None => Context::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    #[test]
    fn injector_sets_long_string_values() {
        let mut headers = FieldTable::default();
        let mut injector = FieldTableInjector(&mut headers);

        injector.set("traceparent", "00-abc123-def456-01".to_string());

        let extractor = FieldTableExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("00-abc123-def456-01"));
    }

    #[test]
    fn injector_overwrites_existing_key() {
        let mut headers = FieldTable::default();
        let mut injector = FieldTableInjector(&mut headers);

        injector.set("key", "value1".to_string());
        injector.set("key", "value2".to_string());

        assert_eq!(FieldTableExtractor(&headers).get("key"), Some("value2"));
    }

    #[test]
    fn extractor_returns_none_for_missing_or_non_string_keys() {
        let mut headers = FieldTable::default();
        headers.insert("count".to_string().into(), AMQPValue::LongInt(7));

        let extractor = FieldTableExtractor(&headers);
        assert_eq!(extractor.get("missing"), None);
        assert_eq!(extractor.get("count"), None);
    }

    #[test]
    fn extractor_keys_enumerates_all_keys() {
        let mut headers = FieldTable::default();
        let mut injector = FieldTableInjector(&mut headers);
        injector.set("a", "1".to_string());
        injector.set("b", "2".to_string());

        let extractor = FieldTableExtractor(&headers);
        let mut keys = extractor.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn field_table_round_trips_trace_context() {
        let propagator = TraceContextPropagator::new();
        let span_context = SpanContext::new(
            TraceId::from(0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c),
            SpanId::from(0xb7ad_6b71_6920_3331),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(span_context.clone());

        let mut headers = FieldTable::default();
        propagator.inject_context(&cx, &mut FieldTableInjector(&mut headers));
        let restored = propagator.extract(&FieldTableExtractor(&headers));

        assert_eq!(
            restored.span().span_context().trace_id(),
            span_context.trace_id()
        );
    }
}
