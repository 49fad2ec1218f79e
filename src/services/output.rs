use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::record::ParsedRecordMessage;

/// Downstream destination for parsed records.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, message: &ParsedRecordMessage) -> Result<(), OutputError>;
}

/// Pushes parsed records onto a Redis list read by downstream consumers.
pub struct RedisOutputSink {
    client: redis::Client,
    key: String,
}

impl RedisOutputSink {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, OutputError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key: key.into(),
        })
    }
}

#[async_trait]
impl OutputSink for RedisOutputSink {
    async fn emit(&self, message: &ParsedRecordMessage) -> Result<(), OutputError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;
        conn.lpush::<_, _, ()>(&self.key, &payload).await?;

        tracing::debug!(
            record_id = %message.record_id,
            resend = message.resend,
            "Emitted parsed record"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Output channel unavailable: {0}")]
    Unavailable(String),
}
