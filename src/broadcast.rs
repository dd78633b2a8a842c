//! Broadcast intake: expands one text into one delivery job per subscriber.

use std::sync::Arc;

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::domain::delivery_job::DeliveryJob;
use crate::domain::subscriber::Subscriber;
use crate::error_chain_fmt;
use crate::queue::DeliveryQueue;
use crate::store::{StoreError, SubscriberStore};

/// What to do when settings were read but subscribers could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionFailurePolicy {
    /// Log the failure and fan out to nobody.
    #[default]
    TreatAsEmpty,
    Abort,
}

impl ResolutionFailurePolicy {
    pub fn from_abort_flag(abort: bool) -> Self {
        if abort {
            ResolutionFailurePolicy::Abort
        } else {
            ResolutionFailurePolicy::TreatAsEmpty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub broadcast_id: Uuid,
    pub resolved: usize,
    pub published: usize,
    pub failed: usize,
}

#[derive(thiserror::Error)]
pub enum BroadcastError {
    #[error("Failed to read from the subscriber store.")]
    StoreUnavailable(#[source] StoreError),
}

impl std::fmt::Debug for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[tracing::instrument(
    name = "Broadcasting a message",
    skip(store, queue, text),
    fields(broadcast_id = tracing::field::Empty)
)]
pub async fn broadcast(
    store: &dyn SubscriberStore,
    queue: Arc<dyn DeliveryQueue>,
    text: &str,
    policy: ResolutionFailurePolicy,
) -> Result<BroadcastReport, BroadcastError> {
    let settings = store
        .broadcast_settings()
        .await
        .map_err(BroadcastError::StoreUnavailable)?;
    let body = settings.compose(text);

    let subscribers = match store.active_subscribers().await {
        Ok(subscribers) => subscribers,
        Err(err) if policy == ResolutionFailurePolicy::Abort => {
            return Err(BroadcastError::StoreUnavailable(err));
        }
        Err(err) => {
            tracing::error!("Failed to resolve subscribers, nobody will be notified: {:?}", err);
            Vec::new()
        }
    };

    let broadcast_id = Uuid::new_v4();
    tracing::Span::current().record("broadcast_id", tracing::field::display(broadcast_id));

    let jobs = subscribers.into_iter().map(|Subscriber { phone_number, .. }| DeliveryJob {
        to: phone_number,
        from: settings.from_number.clone(),
        body: body.clone(),
        broadcast_id: Some(broadcast_id),
    });

    let report = publish_all(queue, jobs, broadcast_id).await;

    tracing::info!(
        resolved = report.resolved,
        published = report.published,
        failed = report.failed,
        "Broadcast fanned out"
    );

    Ok(report)
}

/// Publishes every job concurrently; one failed publish never stops the others.
async fn publish_all(
    queue: Arc<dyn DeliveryQueue>,
    jobs: impl Iterator<Item = DeliveryJob>,
    broadcast_id: Uuid,
) -> BroadcastReport {
    let mut publishes = JoinSet::new();

    for job in jobs {
        let queue = queue.clone();
        publishes.spawn(async move {
            match queue.publish(&job).await {
                Ok(()) => {
                    tracing::debug!(recipient = %job.to, "Delivery job queued");
                    true
                }
                Err(err) => {
                    tracing::error!(recipient = %job.to, "Failed to queue delivery job: {:?}", err);
                    false
                }
            }
        });
    }

    let mut report = BroadcastReport {
        broadcast_id,
        resolved: publishes.len(),
        published: 0,
        failed: 0,
    };

    while let Some(result) = publishes.join_next().await {
        match result {
            Ok(true) => report.published += 1,
            Ok(false) => report.failed += 1,
            Err(err) => {
                tracing::error!("Publish task panicked: {:?}", err);
                report.failed += 1;
            }
        }
    }

    report
}
