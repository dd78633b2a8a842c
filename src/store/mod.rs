//! Read/write contract over subscribers and broadcast settings.
//!
//! The intake only reads through this trait and the opt-out handler is the
//! only writer. Records are created outside this service.

mod in_memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::broadcast_settings::BroadcastSettings;
use crate::domain::phone_number::PhoneNumber;
use crate::domain::subscriber::Subscriber;
use crate::error_chain_fmt;

pub use in_memory::InMemorySubscriberStore;
pub use postgres::PostgresSubscriberStore;

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn broadcast_settings(&self) -> Result<BroadcastSettings, StoreError>;

    /// Subscribers that have not opted out, as of the moment of the call.
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Sets `opted_out_at` only if it is not set yet; the first timestamp wins.
    async fn opt_out(
        &self,
        phone_number: &PhoneNumber,
        at: DateTime<Utc>,
    ) -> Result<OptOutOutcome, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptOutOutcome {
    Recorded(PhoneNumber),
    AlreadyOptedOut(PhoneNumber),
    UnknownSubscriber,
    NotAnOptOut,
}

impl OptOutOutcome {
    /// Number the caller should report as opted out, if any.
    pub fn updated(&self) -> Option<&PhoneNumber> {
        match self {
            OptOutOutcome::Recorded(number) | OptOutOutcome::AlreadyOptedOut(number) => Some(number),
            OptOutOutcome::UnknownSubscriber | OptOutOutcome::NotAnOptOut => None,
        }
    }
}

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("The subscriber store is unavailable.")]
    Unavailable(#[source] sqlx::Error),
    #[error("Failed to persist the subscriber update.")]
    Write(#[source] sqlx::Error),
    #[error("The subscriber store returned an invalid record: {0}")]
    InvalidRecord(String),
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
