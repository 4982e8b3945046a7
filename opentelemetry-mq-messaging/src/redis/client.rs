//! Thin wrapper over the async Redis client for stream operations.

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::debug;

use super::DATA_FIELD;
use crate::error::Error;

/// Connection settings for the Redis client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Optional password; empty string for no password.
    #[serde(default)]
    pub password: String,
    /// Database to select after connecting; 0 for the default database.
    #[serde(default)]
    pub database: i64,
}

impl RedisConfig {
    fn connection_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.database
            )
        }
    }
}

/// Async Redis client scoped to the stream operations the transport needs.
#[derive(Clone)]
pub struct Client {
    connection: MultiplexedConnection,
}

impl Client {
    /// Connect to Redis. Connection failures are fatal to the caller.
    pub async fn connect(config: &RedisConfig) -> Result<Self, Error> {
        let client = redis::Client::open(config.connection_url())?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Client { connection })
    }

    /// XADD an encoded envelope to the stream, returning the generated entry id.
    pub async fn publish_to_stream(&self, stream_key: &str, data: &str) -> Result<String, Error> {
        let mut connection = self.connection.clone();
        let id: String = connection
            .xadd(stream_key, "*", &[(DATA_FIELD, data)])
            .await?;
        debug!(stream = stream_key, entry = %id, "published to stream");
        Ok(id)
    }

    /// Create the stream and consumer group if they do not exist yet.
    ///
    /// Uses `XGROUP CREATE … MKSTREAM` with `$` so the group only sees
    /// entries added after creation; an already-existing group (BUSYGROUP)
    /// is not an error.
    pub async fn ensure_group(&self, stream_key: &str, consumer_group: &str) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        let created: Result<String, redis::RedisError> = connection
            .xgroup_create_mkstream(stream_key, consumer_group, "$")
            .await;
        match created {
            Ok(_) => {
                debug!(stream = stream_key, group = consumer_group, "created consumer group");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// XREADGROUP from the stream on behalf of a consumer-group member.
    ///
    /// `last_id` of `"0"` reads this consumer's pending entries; `">"` reads
    /// entries not yet delivered to anyone in the group. `block_ms` bounds
    /// the wait so the caller's loop can observe shutdown.
    pub async fn read_group(
        &self,
        stream_key: &str,
        consumer_group: &str,
        consumer_name: &str,
        last_id: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<StreamReadReply, Error> {
        let mut connection = self.connection.clone();
        let options = StreamReadOptions::default()
            .group(consumer_group, consumer_name)
            .count(count)
            .block(block_ms);
        let reply: Option<StreamReadReply> = connection
            .xread_options(&[stream_key], &[last_id], &options)
            .await?;
        Ok(reply.unwrap_or_default())
    }

    /// XACK a processed entry.
    pub async fn ack(&self, stream_key: &str, consumer_group: &str, id: &str) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        let _: i64 = connection.xack(stream_key, consumer_group, &[id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_without_password() {
        let config = RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
        };
        assert_eq!(config.connection_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn connection_url_with_password_and_database() {
        let config = RedisConfig {
            host: "redis".to_string(),
            port: 6380,
            password: "hunter2".to_string(),
            database: 3,
        };
        assert_eq!(config.connection_url(), "redis://:hunter2@redis:6380/3");
    }
}
