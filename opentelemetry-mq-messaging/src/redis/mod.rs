//! Redis-stream transport: connection wrapper, envelope publisher, and
//! consumer-group consumer.
//!
//! Messages travel as stream entries with a single `data` field holding the
//! base64-encoded [`Envelope`](crate::Envelope). Delivery is at-least-once:
//! the consumer acknowledges every entry after handling it, and retries are
//! requeued as new entries by the retry processor rather than through
//! transport-level redelivery.

mod client;
mod consumer;
mod publisher;

pub use client::{Client, RedisConfig};
pub use consumer::{EnvelopeHandler, StreamConsumer};
pub use publisher::StreamPublisher;

/// Stream-entry field that carries the encoded envelope.
pub(crate) const DATA_FIELD: &str = "data";
