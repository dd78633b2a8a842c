use crate::domain::status_notification::StatusNotification;
use crate::error_chain_fmt;
use crate::store::{OptOutOutcome, StoreError, SubscriberStore};

#[derive(thiserror::Error)]
pub enum OptOutError {
    #[error("{0}")]
    InvalidNotification(String),
    #[error("Failed to record the opt-out.")]
    StoreWrite(#[source] StoreError),
}

impl std::fmt::Debug for OptOutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Applies an inbound gateway notification to the subscriber store.
///
/// Only a `stop` content or keyword touches the store. Repeated signals keep
/// the first recorded timestamp.
#[tracing::instrument(
    name = "Handling a status notification",
    skip(store, notification),
    fields(
        msisdn = ?notification.msisdn,
        keyword = ?notification.keyword
    )
)]
pub async fn handle_status(
    store: &dyn SubscriberStore,
    notification: &StatusNotification,
) -> Result<OptOutOutcome, OptOutError> {
    if !notification.is_opt_out() {
        return Ok(OptOutOutcome::NotAnOptOut);
    }

    let signal = notification
        .opt_out_signal()
        .map_err(OptOutError::InvalidNotification)?;

    let outcome = store
        .opt_out(&signal.phone_number, signal.at)
        .await
        .map_err(OptOutError::StoreWrite)?;

    match &outcome {
        OptOutOutcome::Recorded(number) => {
            tracing::info!(phone_number = %number, opted_out_at = %signal.at, "Subscriber opted out")
        }
        OptOutOutcome::AlreadyOptedOut(number) => {
            tracing::info!(phone_number = %number, "Subscriber had already opted out")
        }
        OptOutOutcome::UnknownSubscriber => {
            tracing::warn!(phone_number = %signal.phone_number, "Opt-out for an unknown number")
        }
        OptOutOutcome::NotAnOptOut => {}
    }

    Ok(outcome)
}
