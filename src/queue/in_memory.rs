use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{decode_payload, DeliveryQueue, PublishError, QueueConsumer, QueueError};
use crate::domain::delivery_job::DeliveryJob;

/// Process-local delivery queue with the same handoff semantics as the
/// broker: each payload is popped by exactly one consumer.
///
/// Payloads are stored in their wire encoding. Clones share the same queue.
#[derive(Clone, Default)]
pub struct InMemoryDeliveryQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    payloads: Mutex<VecDeque<String>>,
    published: Notify,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a raw payload, bypassing encoding.
    pub async fn push_raw(&self, payload: String) {
        self.inner.payloads.lock().await.push_back(payload);
        self.inner.published.notify_one();
    }

    /// Jobs waiting for a consumer. Payloads that fail to decode are skipped.
    pub async fn pending(&self) -> Vec<DeliveryJob> {
        self.inner
            .payloads
            .lock()
            .await
            .iter()
            .filter_map(|payload| DeliveryJob::decode(payload).ok())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.payloads.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn pop(&self) -> Option<String> {
        self.inner.payloads.lock().await.pop_front()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn publish(&self, job: &DeliveryJob) -> Result<(), PublishError> {
        let payload = job.encode()?;
        self.push_raw(payload).await;

        Ok(())
    }

    async fn connect_consumer(&self) -> Result<Box<dyn QueueConsumer>, QueueError> {
        Ok(Box::new(InMemoryQueueConsumer {
            queue: self.clone(),
        }))
    }
}

pub struct InMemoryQueueConsumer {
    queue: InMemoryDeliveryQueue,
}

#[async_trait]
impl QueueConsumer for InMemoryQueueConsumer {
    async fn next_job(&mut self, wait: Duration) -> Result<Option<DeliveryJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(payload) = self.queue.pop().await {
                return decode_payload(payload).map(Some);
            }

            // Another consumer may win the race for the payload we were
            // notified about, so keep waiting until the deadline.
            let notified = self.queue.inner.published.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
