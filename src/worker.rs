//! A single delivery worker: pulls one job at a time and hands it to the SMS
//! gateway.
//!
//! Gateway failures are logged and the job is dropped; there is no retry and
//! no requeue. Broker failures end the worker and the pool starts it again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::delivery_job::DeliveryJob;
use crate::error_chain_fmt;
use crate::queue::{DeliveryQueue, QueueError};
use crate::sms_client::SmsClient;

#[derive(thiserror::Error)]
pub enum WorkerError {
    #[error("Worker {worker_id} could not connect to the delivery queue.")]
    QueueConnect {
        worker_id: usize,
        #[source]
        source: QueueError,
    },
    #[error("Worker {worker_id} lost its delivery queue connection.")]
    Queue {
        worker_id: usize,
        #[source]
        source: QueueError,
    },
    #[error("Worker {worker_id} panicked: {message}")]
    Panicked { worker_id: usize, message: String },
    #[error("Workers did not stop within {timeout:?}.")]
    ShutdownTimeout { timeout: Duration },
}

impl std::fmt::Debug for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub struct DeliveryWorker {
    id: usize,
    queue: Arc<dyn DeliveryQueue>,
    sms_client: Arc<SmsClient>,
    poll_timeout: Duration,
    shutdown: CancellationToken,
}

impl DeliveryWorker {
    pub fn new(
        id: usize,
        queue: Arc<dyn DeliveryQueue>,
        sms_client: Arc<SmsClient>,
        poll_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            sms_client,
            poll_timeout,
            shutdown,
        }
    }

    /// Runs until the shutdown token is cancelled or the broker fails.
    ///
    /// The token is only checked between jobs, so a dispatch that already
    /// started always completes.
    pub async fn run(self) -> Result<(), WorkerError> {
        let worker_id = self.id;
        let mut consumer = self
            .queue
            .connect_consumer()
            .await
            .map_err(|source| WorkerError::QueueConnect { worker_id, source })?;

        tracing::info!(worker_id, "Waiting for delivery jobs");

        while !self.shutdown.is_cancelled() {
            match consumer.next_job(self.poll_timeout).await {
                Ok(Some(job)) => dispatch_sms(&self.sms_client, &job, worker_id).await,
                Ok(None) => continue,
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(worker_id, "Skipping delivery job: {:?}", err);
                }
                Err(source) => return Err(WorkerError::Queue { worker_id, source }),
            }
        }

        Ok(())
    }
}

/// Sends one job through the gateway. The outcome is only logged.
#[tracing::instrument(
    name = "Dispatching an SMS",
    skip(sms_client, job),
    fields(
        recipient = %job.to,
        broadcast_id = ?job.broadcast_id
    )
)]
pub async fn dispatch_sms(sms_client: &SmsClient, job: &DeliveryJob, worker_id: usize) {
    match sms_client.send_sms(&job.from, &job.to, &job.body).await {
        Ok(()) => tracing::info!("SMS delivered to the gateway"),
        Err(err) => tracing::error!("SMS dropped after a gateway failure: {:?}", err),
    }
}
