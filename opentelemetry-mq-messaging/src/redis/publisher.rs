//! Envelope publisher for a single Redis stream.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;

use super::Client;
use crate::envelope::Envelope;
use crate::error::Error;
use crate::processor::Publisher;

/// Publishes typed envelopes to one stream key.
///
/// The envelope is JSON-encoded, base64-wrapped, and stored under the `data`
/// field of the stream entry. The retry processor republishes through the
/// same type, so retried copies land on the stream they came from.
pub struct StreamPublisher<T> {
    stream_key: String,
    client: Client,
    _payload: PhantomData<fn(T)>,
}

impl<T> StreamPublisher<T> {
    pub fn new(stream_key: impl Into<String>, client: Client) -> Self {
        StreamPublisher {
            stream_key: stream_key.into(),
            client,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Publisher<T> for StreamPublisher<T>
where
    T: Serialize + Send + Sync,
{
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), Error> {
        let data = envelope.encode()?;
        self.client
            .publish_to_stream(&self.stream_key, &data)
            .await?;
        Ok(())
    }
}
