//! Fixed-size pool of delivery workers with an explicit start/stop lifecycle.
//!
//! Workers share nothing but the shutdown token; each one owns its own queue
//! connection and the broker decides which worker gets which job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerPoolSettings;
use crate::queue::DeliveryQueue;
use crate::sms_client::SmsClient;
use crate::worker::{DeliveryWorker, WorkerError};

const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(30);

pub struct WorkerPool {
    settings: WorkerPoolSettings,
    queue: Arc<dyn DeliveryQueue>,
    sms_client: Arc<SmsClient>,
    shutdown: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<(), WorkerError>>>,
}

impl WorkerPool {
    pub fn new(
        settings: WorkerPoolSettings,
        queue: Arc<dyn DeliveryQueue>,
        sms_client: Arc<SmsClient>,
    ) -> Self {
        Self {
            settings,
            queue,
            sms_client,
            shutdown: CancellationToken::new(),
            worker_handles: Vec::new(),
        }
    }

    /// Spawns `worker_count` workers and returns without waiting for them.
    ///
    /// A worker that loses the broker is started again after an exponential
    /// backoff, so a broker restart only pauses delivery. Jobs that were
    /// pending in the broker at that moment are not recovered.
    pub fn spawn_workers(&mut self) {
        tracing::info!(
            worker_count = self.settings.worker_count,
            "Spawning delivery workers"
        );

        for worker_id in 0..self.settings.worker_count {
            let handle = tokio::spawn(supervise_worker(
                worker_id,
                self.queue.clone(),
                self.sms_client.clone(),
                self.settings.clone(),
                self.shutdown.clone(),
            ));

            self.worker_handles.push(handle);
        }
    }

    pub fn active_workers(&self) -> usize {
        self.worker_handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stops pulling new jobs, lets in-flight dispatches finish and waits for
    /// every worker up to `timeout`.
    ///
    /// Returns the last error of each worker that was waiting to be restarted.
    pub async fn shutdown_graceful(
        mut self,
        timeout: Duration,
    ) -> Result<Vec<WorkerError>, WorkerError> {
        tracing::info!(
            worker_count = self.worker_handles.len(),
            "Stopping delivery workers"
        );

        self.shutdown.cancel();
        let handles = std::mem::take(&mut self.worker_handles);

        let join_all = async move {
            let mut failures = Vec::new();

            for (worker_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => failures.push(err),
                    Err(join_error) => failures.push(WorkerError::Panicked {
                        worker_id,
                        message: join_error.to_string(),
                    }),
                }
            }

            failures
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(failures) => {
                tracing::info!(failed_workers = failures.len(), "Delivery workers stopped");
                Ok(failures)
            }
            Err(_elapsed) => {
                tracing::error!("Delivery workers did not stop in time");
                Err(WorkerError::ShutdownTimeout { timeout })
            }
        }
    }
}

/// Runs one worker slot until shutdown, restarting the worker whenever it
/// fails. Returns the last failure when shutdown interrupts a backoff.
async fn supervise_worker(
    worker_id: usize,
    queue: Arc<dyn DeliveryQueue>,
    sms_client: Arc<SmsClient>,
    settings: WorkerPoolSettings,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    let initial_backoff = settings.restart_backoff();
    let mut backoff = initial_backoff;

    loop {
        let worker = DeliveryWorker::new(
            worker_id,
            queue.clone(),
            sms_client.clone(),
            settings.poll_timeout(),
            shutdown.clone(),
        );
        let started_at = Instant::now();

        let err = match worker.run().await {
            Ok(()) => {
                tracing::info!(worker_id, "Delivery worker stopped");
                return Ok(());
            }
            Err(err) => err,
        };

        // A worker that stayed up for a while starts over from the first delay.
        if started_at.elapsed() > MAX_RESTART_BACKOFF {
            backoff = initial_backoff;
        }

        tracing::error!(
            worker_id,
            restart_in = ?backoff,
            "Delivery worker terminated: {:?}",
            err
        );

        tokio::select! {
            _ = shutdown.cancelled() => return Err(err),
            _ = tokio::time::sleep(backoff) => {}
        }

        backoff = (backoff * 2).min(MAX_RESTART_BACKOFF.max(initial_backoff));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() && self.active_workers() > 0 {
            tracing::warn!("Worker pool dropped without a graceful shutdown, cancelling workers");
            self.shutdown.cancel();
        }
    }
}
