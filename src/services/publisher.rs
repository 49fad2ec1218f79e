use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::job::StatusMessage;

/// Notification channel for job statuses. Delivery is best effort.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, message: &StatusMessage) -> Result<(), PublishError>;
}

/// Publishes status messages on a Redis pub/sub channel.
pub struct RedisStatusPublisher {
    client: redis::Client,
    channel: String,
}

impl RedisStatusPublisher {
    pub fn new(redis_url: &str, channel: impl Into<String>) -> Result<Self, PublishError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl StatusPublisher for RedisStatusPublisher {
    async fn publish(&self, message: &StatusMessage) -> Result<(), PublishError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;

        tracing::debug!(
            record_id = %message.record_id,
            status = %message.status,
            channel = %self.channel,
            "Publishing status"
        );
        let receivers: u64 = conn.publish(&self.channel, &payload).await?;
        tracing::trace!(receivers, "Status delivered");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Status channel unavailable: {0}")]
    Unavailable(String),
}
