use redis::AsyncCommands;

use crate::models::job::JobRequest;

/// A dequeued request together with the exact payload held in the
/// processing list, so acknowledging removes that entry and nothing else.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub request: JobRequest,
    payload: String,
}

/// Redis-backed inbound job queue.
///
/// Dequeued jobs sit in a processing list owned by one worker
/// (`<queue>:processing:<worker_id>`) until acknowledged. Jobs left there by
/// a crash are moved back with `requeue_in_flight` when a worker with the
/// same id starts again; other workers' lists are never touched.
pub struct JobQueue {
    client: redis::Client,
    queue_key: String,
    processing_key: String,
}

impl JobQueue {
    pub fn new(redis_url: &str, queue_key: &str, worker_id: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            queue_key: queue_key.to_string(),
            processing_key: format!("{}:processing:{}", queue_key, worker_id),
        })
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    /// Enqueue a job request.
    pub async fn enqueue(&self, request: &JobRequest) -> Result<(), QueueError> {
        let payload = serde_json::to_string(request).map_err(QueueError::Serialize)?;
        self.push(&payload).await
    }

    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&self.queue_key, payload).await?;
        Ok(())
    }

    /// Pop the next job into the processing list.
    ///
    /// A payload that does not decode is dropped from the processing list and
    /// reported as `QueueError::Serialize`.
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn
            .rpoplpush(&self.queue_key, &self.processing_key)
            .await?;

        let Some(payload) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<JobRequest>(&payload) {
            Ok(request) => Ok(Some(Delivery { request, payload })),
            Err(e) => {
                tracing::error!(error = %e, payload = %payload, "Dropping undecodable job request");
                conn.lrem::<_, _, ()>(&self.processing_key, 1, &payload).await?;
                Err(QueueError::Serialize(e))
            }
        }
    }

    /// Acknowledge a job (remove it from the processing list).
    pub async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.payload)
            .await?;
        Ok(())
    }

    /// Put a job back on the queue for redelivery and acknowledge this attempt.
    pub async fn redeliver(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.push(&delivery.payload).await?;
        self.complete(delivery).await
    }

    /// Move every job left in this worker's processing list back onto the
    /// queue. Returns the number of jobs moved.
    pub async fn requeue_in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut moved = 0;
        loop {
            let payload: Option<String> = conn
                .rpoplpush(&self.processing_key, &self.queue_key)
                .await?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(&self.queue_key).await?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
