//! OpenTelemetry context propagation and retry processing for message-queue transports.
//!
//! This crate wires three things together for services that talk to a message
//! broker or a Redis stream:
//!
//! - [`Injector`]/[`Extractor`] carriers that move W3C Trace Context through
//!   transport message headers (AMQP header tables, envelope header maps)
//! - A generic [`Envelope`] wire format (JSON, base64-encoded) carrying trace
//!   headers, a typed payload, and a retry counter
//! - A [`Processor`] that retries failed handlers by republishing the envelope
//!   with exponential backoff instead of blocking transport redelivery
//!
//! Telemetry setup (tracer provider, propagator, log subscriber) lives in
//! [`telemetry`].
//!
//! # Features
//!
//! - `redis` - Redis-stream client, publisher, and consumer-group consumer (enabled by default)
//! - `amqp` - AMQP header-table carriers and property helpers (enabled by default)
//!
//! # Example
//!
//! ## Publishing with trace context
//!
//! ```ignore
//! use opentelemetry_mq_messaging::{propagation, Envelope};
//! use opentelemetry::Context;
//!
//! let mut envelope = Envelope::new(payload);
//! propagation::stamp_envelope(&Context::current(), &mut envelope);
//! publisher.publish(&envelope).await?;
//! ```
//!
//! ## Consuming with retry/republish
//!
//! ```ignore
//! let mut processor = Processor::new(publisher, ProcessorConfig::default());
//! consumer.run(&mut handler).await?;
//! // inside the handler:
//! processor.process(envelope, |payload| async move { handle(payload).await }).await?;
//! ```
//!
//! [`Injector`]: opentelemetry::propagation::Injector
//! [`Extractor`]: opentelemetry::propagation::Extractor

pub mod envelope;
pub mod error;
pub mod processor;
pub mod propagation;
pub mod telemetry;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "redis")]
pub mod redis;

// Re-exports for convenience
pub use envelope::{Envelope, EventHeader};
pub use error::{BoxError, Error};
pub use processor::{Processor, ProcessorConfig, Publisher, MAX_RETRIES};
pub use propagation::{HeaderExtractor, HeaderInjector};

#[cfg(feature = "redis")]
pub use self::redis::{Client, EnvelopeHandler, RedisConfig, StreamConsumer, StreamPublisher};
