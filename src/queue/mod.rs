//! Broker-backed channel between the broadcast intake and the delivery workers.
//!
//! Delivery is at-most-once: a job leaves the queue when it is handed to a
//! consumer, before anyone knows whether the SMS went out. Nothing is
//! redelivered, ordered or deduplicated, and pending jobs do not survive a
//! broker restart.

mod in_memory;
mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::delivery_job::DeliveryJob;
use crate::error_chain_fmt;

pub use in_memory::InMemoryDeliveryQueue;
pub use redis_queue::RedisDeliveryQueue;

pub const DEFAULT_QUEUE_NAME: &str = "notifications";

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn publish(&self, job: &DeliveryJob) -> Result<(), PublishError>;

    /// Opens a consumer with its own broker connection.
    async fn connect_consumer(&self) -> Result<Box<dyn QueueConsumer>, QueueError>;
}

#[async_trait]
pub trait QueueConsumer: Send {
    /// Takes the next job, waiting at most `wait`. `Ok(None)` means the
    /// queue stayed empty. A returned job, or a `Malformed` payload, has
    /// already been removed from the queue.
    async fn next_job(&mut self, wait: Duration) -> Result<Option<DeliveryJob>, QueueError>;
}

#[derive(thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize the delivery job.")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to push the delivery job to the broker.")]
    Broker(#[source] redis::RedisError),
}

#[derive(thiserror::Error)]
pub enum QueueError {
    #[error("Failed to connect to the broker.")]
    Connect(#[source] redis::RedisError),
    #[error("Failed to read from the broker.")]
    Broker(#[source] redis::RedisError),
    #[error("Dropped a malformed delivery job: {payload}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

impl QueueError {
    /// Whether the consumer is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QueueError::Malformed { .. })
    }
}

impl std::fmt::Debug for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl std::fmt::Debug for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

fn decode_payload(payload: String) -> Result<DeliveryJob, QueueError> {
    DeliveryJob::decode(&payload).map_err(|source| QueueError::Malformed { payload, source })
}
