use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{OptOutOutcome, StoreError, SubscriberStore};
use crate::domain::broadcast_settings::BroadcastSettings;
use crate::domain::phone_number::PhoneNumber;
use crate::domain::subscriber::Subscriber;

/// Subscriber store kept in process memory, keyed by phone number.
///
/// Used by the test suite and for running the whole pipeline in a single
/// process without Postgres.
pub struct InMemorySubscriberStore {
    settings: RwLock<BroadcastSettings>,
    subscribers: RwLock<HashMap<PhoneNumber, Subscriber>>,
}

impl InMemorySubscriberStore {
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces the record with the same phone number.
    pub async fn insert(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .await
            .insert(subscriber.phone_number.clone(), subscriber);
    }

    pub async fn subscriber(&self, phone_number: &PhoneNumber) -> Option<Subscriber> {
        self.subscribers.read().await.get(phone_number).cloned()
    }

    pub async fn set_settings(&self, settings: BroadcastSettings) {
        *self.settings.write().await = settings;
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    async fn broadcast_settings(&self) -> Result<BroadcastSettings, StoreError> {
        Ok(self.settings.read().await.clone())
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .read()
            .await
            .values()
            .filter(|subscriber| !subscriber.is_opted_out())
            .cloned()
            .collect())
    }

    async fn opt_out(
        &self,
        phone_number: &PhoneNumber,
        at: DateTime<Utc>,
    ) -> Result<OptOutOutcome, StoreError> {
        // Check and set under the same write guard.
        let mut subscribers = self.subscribers.write().await;

        let outcome = match subscribers.get_mut(phone_number) {
            None => OptOutOutcome::UnknownSubscriber,
            Some(subscriber) if subscriber.is_opted_out() => {
                OptOutOutcome::AlreadyOptedOut(phone_number.clone())
            }
            Some(subscriber) => {
                subscriber.opted_out_at = Some(at);
                OptOutOutcome::Recorded(phone_number.clone())
            }
        };

        Ok(outcome)
    }
}
