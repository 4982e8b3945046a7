//! Error taxonomy shared across the crate.

use thiserror::Error;

/// Boxed error type used at the handler boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by publishers, consumers, the retry processor, and
/// telemetry setup.
///
/// Decode errors are fatal to the single message that produced them and are
/// never routed through the retry path; transport errors are surfaced to the
/// caller unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The envelope has been retried [`MAX_RETRIES`] times and is abandoned.
    ///
    /// [`MAX_RETRIES`]: crate::processor::MAX_RETRIES
    #[error("max retries exceeded")]
    MaxRetriesExceeded,

    /// The raw message could not be decoded into an envelope (malformed
    /// base64 or JSON).
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] BoxError),

    /// The envelope could not be serialized for publishing.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// A message handler failed.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A Redis command failed (connect, publish, read, or ack).
    #[cfg(feature = "redis")]
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Telemetry initialization or shutdown failed.
    #[error("telemetry setup failed: {0}")]
    Telemetry(#[source] BoxError),
}

impl Error {
    /// Wrap a decode failure.
    pub fn decode(err: impl Into<BoxError>) -> Self {
        Error::Decode(err.into())
    }

    /// Wrap a handler failure.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Error::Handler(err.into())
    }

    /// Wrap a telemetry setup failure.
    pub fn telemetry(err: impl Into<BoxError>) -> Self {
        Error::Telemetry(err.into())
    }
}
