//! The envelope wire format shared by all transports.
//!
//! An [`Envelope`] wraps a typed payload together with trace-context headers
//! and a retry counter. On the wire it is JSON, base64-encoded with the
//! standard alphabet, so it can be embedded in any transport field that takes
//! a string:
//!
//! ```json
//! {"header":{"key":"","traceparent":"00-…-01","tracestate":""},"payload":…,"retries":0}
//! ```

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Trace-context header block carried inside the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Routing key, free for the application to use.
    #[serde(default)]
    pub key: String,
    /// W3C `traceparent` header value, empty when no context was injected.
    #[serde(default)]
    pub traceparent: String,
    /// W3C `tracestate` header value.
    #[serde(default)]
    pub tracestate: String,
}

/// Message wrapper carrying trace headers, a typed payload, and a retry count.
///
/// `retries` starts at 0 and is only ever incremented, by
/// [`into_retry`](Envelope::into_retry), when the retry processor republishes
/// a failed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub header: EventHeader,
    pub payload: T,
    #[serde(default)]
    pub retries: u32,
}

impl<T> Envelope<T> {
    /// Create a fresh envelope with no trace context and `retries = 0`.
    pub fn new(payload: T) -> Self {
        Envelope {
            header: EventHeader::default(),
            payload,
            retries: 0,
        }
    }

    /// Set the application routing key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.header.key = key.into();
        self
    }

    /// Consume this envelope and produce the copy that gets republished after
    /// a handler failure: same header and payload, `retries` incremented.
    pub fn into_retry(self) -> Self {
        Envelope {
            retries: self.retries + 1,
            ..self
        }
    }

    /// Trace-context headers as a propagation carrier map.
    pub fn trace_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if !self.header.traceparent.is_empty() {
            headers.insert("traceparent".to_string(), self.header.traceparent.clone());
        }
        if !self.header.tracestate.is_empty() {
            headers.insert("tracestate".to_string(), self.header.tracestate.clone());
        }
        headers
    }

    /// Overwrite the trace-context headers from a propagation carrier map.
    pub fn set_trace_headers(&mut self, headers: HashMap<String, String>) {
        self.header.traceparent = headers.get("traceparent").cloned().unwrap_or_default();
        self.header.tracestate = headers.get("tracestate").cloned().unwrap_or_default();
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode for the wire: JSON, then base64.
    pub fn encode(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self).map_err(Error::Encode)?;
        Ok(BASE64.encode(json))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode from the wire. Malformed base64 or JSON is a decode error,
    /// fatal to this message only.
    pub fn decode(data: &str) -> Result<Self, Error> {
        let json = BASE64.decode(data).map_err(Error::decode)?;
        serde_json::from_slice(&json).map_err(Error::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_wire_format() {
        let mut envelope = Envelope::new("hello".to_string()).with_key("greetings");
        envelope.header.traceparent =
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string();

        let encoded = envelope.encode().unwrap();
        let decoded: Envelope<String> = Envelope::decode(&encoded).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn wire_format_uses_the_documented_field_names() {
        let envelope = Envelope::new(42u32);
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&envelope).unwrap()).unwrap();

        assert!(json.get("header").is_some());
        assert!(json["header"].get("key").is_some());
        assert!(json["header"].get("traceparent").is_some());
        assert!(json["header"].get("tracestate").is_some());
        assert_eq!(json["payload"], 42);
        assert_eq!(json["retries"], 0);
    }

    #[test]
    fn into_retry_increments_and_preserves_payload() {
        let envelope = Envelope::new("hello".to_string());
        let retried = envelope.clone().into_retry();

        assert_eq!(retried.retries, 1);
        assert_eq!(retried.payload, envelope.payload);
        assert_eq!(retried.header, envelope.header);

        assert_eq!(retried.into_retry().retries, 2);
    }

    #[test]
    fn decode_rejects_malformed_base64() {
        assert!(matches!(
            Envelope::<String>::decode("not base64!!"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let garbage = BASE64.encode(b"{not json");
        assert!(matches!(
            Envelope::<String>::decode(&garbage),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn trace_headers_round_trip() {
        let mut envelope = Envelope::new(());
        let mut headers = HashMap::new();
        headers.insert("traceparent".to_string(), "00-abc-def-01".to_string());
        headers.insert("tracestate".to_string(), "vendor=1".to_string());

        envelope.set_trace_headers(headers.clone());
        assert_eq!(envelope.trace_headers(), headers);
    }

    #[test]
    fn missing_retries_defaults_to_zero() {
        let raw = BASE64.encode(br#"{"header":{"key":""},"payload":"hi"}"#);
        let envelope: Envelope<String> = Envelope::decode(&raw).unwrap();
        assert_eq!(envelope.retries, 0);
    }
}
