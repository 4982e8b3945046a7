//! Consumer-group pull loop over a Redis stream.

use std::marker::PhantomData;

use async_trait::async_trait;
use opentelemetry::Context;
use serde::de::DeserializeOwned;
use tracing::{info, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{Client, DATA_FIELD};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::propagation;

/// How long one XREADGROUP call blocks waiting for new entries. Bounded so a
/// cancelled consumer task stops within this window.
const READ_BLOCK_MS: usize = 2000;

/// Batch size for each pending-entry read during startup recovery.
const PENDING_BATCH: usize = 100;

/// Handles one decoded envelope with its restored trace context.
///
/// Implementations typically delegate to the retry
/// [`Processor`](crate::Processor); a returned error is logged by the loop
/// and the entry is acknowledged regardless.
#[async_trait]
pub trait EnvelopeHandler<T>: Send {
    async fn handle(&mut self, cx: &Context, envelope: Envelope<T>) -> Result<(), Error>;
}

/// Sequential consumer over one stream, as one named member of a consumer
/// group.
///
/// Messages are processed strictly one at a time; a backoff sleep inside the
/// handler delays the next message on this loop only. Every entry is
/// acknowledged after handling, whatever the outcome: reprocessing of failed
/// messages goes through the processor's republish, never through withheld
/// acknowledgments.
pub struct StreamConsumer<T> {
    stream_key: String,
    consumer_group: String,
    consumer_name: String,
    client: Client,
    _payload: PhantomData<fn(T)>,
}

impl<T> StreamConsumer<T>
where
    T: DeserializeOwned + Send,
{
    pub fn new(
        stream_key: impl Into<String>,
        consumer_group: impl Into<String>,
        consumer_name: impl Into<String>,
        client: Client,
    ) -> Self {
        StreamConsumer {
            stream_key: stream_key.into(),
            consumer_group: consumer_group.into(),
            consumer_name: consumer_name.into(),
            client,
            _payload: PhantomData,
        }
    }

    /// Pull and handle messages until the task is cancelled or a transport
    /// error occurs.
    ///
    /// Entries left pending by a previous run of this consumer are drained
    /// first. Decode and handler failures are logged and the loop moves on;
    /// read and ack failures terminate the loop and surface to the caller.
    pub async fn run<H>(&self, handler: &mut H) -> Result<(), Error>
    where
        H: EnvelopeHandler<T>,
    {
        self.client
            .ensure_group(&self.stream_key, &self.consumer_group)
            .await?;

        // Pending entries from a previous run are handed out in batches; an
        // empty reply means the id-`0` cursor has passed everything this
        // consumer still owns.
        info!(stream = %self.stream_key, "reading pending messages");
        loop {
            let pending = self
                .client
                .read_group(
                    &self.stream_key,
                    &self.consumer_group,
                    &self.consumer_name,
                    "0",
                    PENDING_BATCH,
                    READ_BLOCK_MS,
                )
                .await?;
            if !has_entries(&pending) {
                break;
            }
            self.dispatch_reply(handler, pending).await?;
        }

        info!(stream = %self.stream_key, group = %self.consumer_group, "listening for new messages");
        loop {
            let reply = self
                .client
                .read_group(
                    &self.stream_key,
                    &self.consumer_group,
                    &self.consumer_name,
                    ">",
                    1,
                    READ_BLOCK_MS,
                )
                .await?;
            self.dispatch_reply(handler, reply).await?;
        }
    }

    async fn dispatch_reply<H>(
        &self,
        handler: &mut H,
        reply: redis::streams::StreamReadReply,
    ) -> Result<(), Error>
    where
        H: EnvelopeHandler<T>,
    {
        for key in reply.keys {
            for entry in key.ids {
                self.dispatch(handler, &entry.id, entry.get::<String>(DATA_FIELD))
                    .await?;
            }
        }
        Ok(())
    }

    /// Decode one entry, hand it to the handler under a span parented on the
    /// propagated context, then acknowledge it.
    async fn dispatch<H>(
        &self,
        handler: &mut H,
        id: &str,
        data: Option<String>,
    ) -> Result<(), Error>
    where
        H: EnvelopeHandler<T>,
    {
        match data.ok_or_else(|| Error::decode("stream entry has no data field")) {
            Ok(data) => match Envelope::<T>::decode(&data) {
                Ok(envelope) => {
                    let parent = propagation::context_from_envelope(&envelope);
                    let span = tracing::info_span!(
                        "stream.process",
                        stream = %self.stream_key,
                        entry = %id,
                        retries = envelope.retries,
                    );
                    span.set_parent(parent.clone());
                    if let Err(err) = handler.handle(&parent, envelope).instrument(span).await {
                        warn!(entry = %id, error = %err, "failed to process message");
                    }
                }
                // Undecodable entries cannot be retried; log and fall through
                // to the ack so they do not clog the pending list.
                Err(err) => warn!(entry = %id, error = %err, "failed to decode message"),
            },
            Err(err) => warn!(entry = %id, error = %err, "failed to decode message"),
        }

        self.client
            .ack(&self.stream_key, &self.consumer_group, id)
            .await
    }
}

fn has_entries(reply: &redis::streams::StreamReadReply) -> bool {
    reply.keys.iter().any(|key| !key.ids.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::streams::{StreamId, StreamKey, StreamReadReply};

    fn reply_with_ids(ids: &[&str]) -> StreamReadReply {
        StreamReadReply {
            keys: vec![StreamKey {
                key: "example-stream".to_string(),
                ids: ids
                    .iter()
                    .map(|id| StreamId {
                        id: id.to_string(),
                        map: Default::default(),
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn pending_drain_stops_only_on_an_empty_reply() {
        // A crashed run can leave more entries pending than one batched read
        // returns; the drain keeps reading until the reply comes back empty.
        assert!(has_entries(&reply_with_ids(&["1-0"])));
        assert!(has_entries(&reply_with_ids(&["1-0", "1-1", "2-0"])));

        assert!(!has_entries(&reply_with_ids(&[])));
        assert!(!has_entries(&StreamReadReply { keys: vec![] }));
    }
}
