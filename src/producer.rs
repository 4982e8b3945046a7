/// Standalone stream producer
/// Run with: cargo run --bin producer
use anyhow::{Context as _, Result};
use opentelemetry_mq_messaging::telemetry::{self, TelemetryConfig};
use opentelemetry_mq_messaging::{propagation, Client, Envelope, Publisher, RedisConfig, StreamPublisher};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::{info, info_span, Instrument};

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Message {
    id: u32,
    content: String,
    timestamp: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = telemetry::init(
        TelemetryConfig::new("stream-producer", env!("CARGO_PKG_VERSION"))
            .with_backend(trace_backend()?),
    )
    .context("failed to initialize telemetry")?;

    let stream_key = std::env::var("STREAM_KEY").unwrap_or_else(|_| "example-stream".to_string());
    let client = Client::connect(&redis_config())
        .await
        .context("failed to connect to redis")?;
    let publisher = StreamPublisher::<Message>::new(stream_key.clone(), client);

    info!(stream = %stream_key, "publishing to stream");

    let mut message_id = 1;
    loop {
        print!("Enter message (or 'quit' to exit): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match publish_message(&publisher, message_id, input).await {
            Ok(()) => message_id += 1,
            Err(err) => eprintln!("failed to publish: {err:#}"),
        }
    }

    telemetry.shutdown().context("telemetry shutdown failed")?;
    Ok(())
}

async fn publish_message(
    publisher: &StreamPublisher<Message>,
    id: u32,
    content: &str,
) -> Result<()> {
    let span = info_span!("publish_message", message.id = id);
    async {
        let message = Message {
            id,
            content: content.to_string(),
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
