use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{Connection, MultiplexedConnection};
use tokio::sync::Mutex;

use super::{decode_payload, DeliveryQueue, PublishError, QueueConsumer, QueueError};
use crate::domain::delivery_job::DeliveryJob;

/// Delivery queue stored as a Redis list.
///
/// Producers `LPUSH` and consumers `BRPOP`, so Redis hands every payload to
/// exactly one consumer and forgets it at that moment.
///
/// Publishers share one multiplexed connection. It does not reconnect on its
/// own, so it is dropped as soon as a command fails and the next publish opens
/// a fresh one.
pub struct RedisDeliveryQueue {
    client: redis::Client,
    queue_name: String,
    publisher: Mutex<Option<MultiplexedConnection>>,
}

impl RedisDeliveryQueue {
    pub fn new(client: redis::Client, queue_name: String) -> Self {
        Self {
            client,
            queue_name,
            publisher: Mutex::new(None),
        }
    }

    async fn publisher(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut publisher = self.publisher.lock().await;

        if let Some(connection) = publisher.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self.client.get_multiplexed_tokio_connection().await?;
        *publisher = Some(connection.clone());

        Ok(connection)
    }

    async fn discard_publisher(&self) {
        if self.publisher.lock().await.take().is_some() {
            tracing::warn!(queue = %self.queue_name, "Dropped the broker connection after a failed publish");
        }
    }
}

#[async_trait]
impl DeliveryQueue for RedisDeliveryQueue {
    #[tracing::instrument(
        name = "Publish a delivery job",
        skip(self, job),
        fields(queue = %self.queue_name, recipient = %job.to)
    )]
    async fn publish(&self, job: &DeliveryJob) -> Result<(), PublishError> {
        let payload = job.encode()?;
        let mut connection = self.publisher().await.map_err(PublishError::Broker)?;

        let pushed = redis::cmd("LPUSH")
            .arg(&self.queue_name)
            .arg(payload)
            .query_async::<_, ()>(&mut connection)
            .await;

        // Not retried: the push may have reached the broker before the failure.
        if let Err(err) = pushed {
            self.discard_publisher().await;
            return Err(PublishError::Broker(err));
        }

        Ok(())
    }

    async fn connect_consumer(&self) -> Result<Box<dyn QueueConsumer>, QueueError> {
        let connection = self
            .client
            .get_tokio_connection()
            .await
            .map_err(QueueError::Connect)?;

        Ok(Box::new(RedisQueueConsumer {
            connection,
            queue_name: self.queue_name.clone(),
        }))
    }
}

pub struct RedisQueueConsumer {
    connection: Connection,
    queue_name: String,
}

#[async_trait]
impl QueueConsumer for RedisQueueConsumer {
    async fn next_job(&mut self, wait: Duration) -> Result<Option<DeliveryJob>, QueueError> {
        // BRPOP treats 0 as "block forever".
        let timeout = wait.as_secs().max(1);

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(timeout)
            .query_async(&mut self.connection)
            .await
            .map_err(QueueError::Broker)?;

        popped
            .map(|(_queue, payload)| decode_payload(payload))
            .transpose()
    }
}
