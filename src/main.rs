use anyhow::{Context as _, Result};
use async_trait::async_trait;
use opentelemetry::Context;
use opentelemetry_mq_messaging::telemetry::{self, TelemetryConfig};
use opentelemetry_mq_messaging::{
    propagation, Client, Envelope, EnvelopeHandler, Error, Publisher, RedisConfig, StreamConsumer,
    StreamPublisher,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, info_span, Instrument};

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Message {
    id: u32,
    content: String,
    timestamp: String,
}

struct LogHandler;

#[async_trait]
impl EnvelopeHandler<Message> for LogHandler {
    async fn handle(&mut self, _cx: &Context, envelope: Envelope<Message>) -> Result<(), Error> {
        info!(
            id = envelope.payload.id,
            content = %envelope.payload.content,
            retries = envelope.retries,
            "received message"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = telemetry::init(
        TelemetryConfig::new("redis-streams-example", env!("CARGO_PKG_VERSION"))
            .with_backend(trace_backend()?),
    )
    .context("failed to initialize telemetry")?;

    let redis_config = redis_config();
    let stream_key = std::env::var("STREAM_KEY").unwrap_or_else(|_| "example-stream".to_string());

    // Separate connections so a blocking stream read on the consumer side
    // never delays a publish.
    let producer_client = Client::connect(&redis_config)
        .await
        .context("failed to connect producer to redis")?;
    let consumer_client = Client::connect(&redis_config)
        .await
        .context("failed to connect consumer to redis")?;

    // Create the group before publishing so the demo messages land in the
    // group's backlog.
    consumer_client
        .ensure_group(&stream_key, "example-group")
        .await
        .context("failed to create consumer group")?;

    let consumer = StreamConsumer::<Message>::new(
        stream_key.clone(),
        "example-group",
        "example-consumer-1",
        consumer_client,
    );
    let consumer_task = tokio::spawn(async move {
        let mut handler = LogHandler;
        consumer.run(&mut handler).await
    });

    let publisher = StreamPublisher::<Message>::new(stream_key, producer_client);
    for id in 1..=3 {
        publish_message(&publisher, id).await?;
        sleep(Duration::from_millis(500)).await;
    }

    // Let the consumer drain the stream before tearing everything down.
    sleep(Duration::from_secs(3)).await;
    consumer_task.abort();

    telemetry.shutdown().context("telemetry shutdown failed")?;
    info!("example completed");
    Ok(())
}

async fn publish_message(publisher: &StreamPublisher<Message>, id: u32) -> Result<()> {
    let span = info_span!("publish_message", message.id = id);
    async {
        let message = Message {
            id,
            content: format!("Test message number {id}"),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut envelope = Envelope::new(message);
        propagation::stamp_envelope(&telemetry::current_context(), &mut envelope);

        publisher
            .publish(&envelope)
            .await
            .context("failed to publish message")?;
        info!(traceparent = %envelope.header.traceparent, "published message");
        Ok(())
    }
    .instrument(span)
    .await
}

fn trace_backend() -> Result<telemetry::Backend> {
    match std::env::var("TRACE_BACKEND") {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(telemetry::Backend::default()),
    }
}

fn redis_config() -> RedisConfig {
    RedisConfig {
        host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("REDIS_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(6379),
        password: std::env::var("REDIS_PASSWORD").unwrap_or_default(),
        database: 0,
    }
}
