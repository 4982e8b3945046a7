/// Standalone stream consumer with retry/republish processing
/// Run with: cargo run --bin consumer
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use opentelemetry::Context;
use opentelemetry_mq_messaging::telemetry::{self, TelemetryConfig};
use opentelemetry_mq_messaging::{
    BoxError, Client, Envelope, EnvelopeHandler, Error, Processor, ProcessorConfig, RedisConfig,
    StreamConsumer, StreamPublisher,
};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Message {
    id: u32,
    content: String,
    timestamp: String,
}

/// Routes every envelope through the retry processor; failed messages are
/// requeued on the same stream with an incremented retry counter.
struct RetryingHandler {
    processor: Processor<StreamPublisher<Message>>,
    simulate_failure: bool,
}

#[async_trait]
impl EnvelopeHandler<Message> for RetryingHandler {
    async fn handle(&mut self, _cx: &Context, envelope: Envelope<Message>) -> Result<(), Error> {
        let simulate_failure = self.simulate_failure;
        self.processor
            .process(envelope, |message| async move {
                handle_message(message, simulate_failure).await
            })
            .await
    }
}

async fn handle_message(message: Message, simulate_failure: bool) -> Result<(), BoxError> {
    let span = info_span!("handle_message", message.id = message.id);
    async move {
        if let Some((trace_id, span_id)) = telemetry::trace_ids() {
            info!(
                dd.trace_id = %trace_id,
                dd.span_id = %span_id,
                content = %message.content,
                "handling event"
            );
        } else {
            info!(content = %message.content, "handling event");
        }

        if simulate_failure {
            return Err("simulated handler failure".into());
        }
        Ok(())
    }
    .instrument(span)
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = telemetry::init(
        TelemetryConfig::new("stream-consumer", env!("CARGO_PKG_VERSION"))
            .with_backend(trace_backend()?),
    )
    .context("failed to initialize telemetry")?;

    let redis_config = redis_config();
    let stream_key = std::env::var("STREAM_KEY").unwrap_or_else(|_| "example-stream".to_string());
    let consumer_group =
        std::env::var("CONSUMER_GROUP").unwrap_or_else(|_| "example-group".to_string());
    let consumer_name =
        std::env::var("CONSUMER_NAME").unwrap_or_else(|_| "example-consumer-1".to_string());
    let simulate_failure = std::env::var("SIMULATE_FAILURE").is_ok();

    // The republish path gets its own connection so it is never stuck behind
    // a blocking stream read.
    let consumer_client = Client::connect(&redis_config)
        .await
        .context("failed to connect consumer to redis")?;
    let publisher_client = Client::connect(&redis_config)
        .await
        .context("failed to connect publisher to redis")?;

    let publisher = StreamPublisher::<Message>::new(stream_key.clone(), publisher_client);
    let mut handler = RetryingHandler {
        processor: Processor::new(publisher, ProcessorConfig::default()),
        simulate_failure,
    };
    let consumer = StreamConsumer::<Message>::new(
        stream_key.clone(),
        consumer_group,
        consumer_name,
        consumer_client,
    );

    info!(stream = %stream_key, "consumer starting");

    // Ctrl-C cancels the run future, which also cuts short an in-flight
    // backoff sleep.
    tokio::select! {
        result = consumer.run(&mut handler) => {
            result.context("consumer terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    telemetry.shutdown().context("telemetry shutdown failed")?;
    Ok(())
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
