use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use super::{OptOutOutcome, StoreError, SubscriberStore};
use crate::domain::broadcast_settings::BroadcastSettings;
use crate::domain::phone_number::PhoneNumber;
use crate::domain::subscriber::Subscriber;

pub struct PostgresSubscriberStore {
    db_pool: PgPool,
}

impl PostgresSubscriberStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub fn db_pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl SubscriberStore for PostgresSubscriberStore {
    #[tracing::instrument(name = "Read broadcast settings", skip(self))]
    async fn broadcast_settings(&self) -> Result<BroadcastSettings, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT from_number, prefix, suffix
            FROM broadcast_settings
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.db_pool)
        .await
        .map_err(StoreError::Unavailable)?;

        let from_number = PhoneNumber::parse(row.get("from_number"))
            .map_err(StoreError::InvalidRecord)?;

        Ok(BroadcastSettings {
            from_number,
            prefix: row.get("prefix"),
            suffix: row.get("suffix"),
        })
    }

    #[tracing::instrument(name = "Resolve active subscribers", skip(self))]
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, phone_number, opted_out_at
            FROM subscribers
            WHERE opted_out_at IS NULL
            "#,
        )
        .fetch_all(&self.db_pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().filter_map(parse_subscriber).collect())
    }

    #[tracing::instrument(
        name = "Opt out a subscriber",
        skip(self),
        fields(phone_number = %phone_number)
    )]
    async fn opt_out(
        &self,
        phone_number: &PhoneNumber,
        at: DateTime<Utc>,
    ) -> Result<OptOutOutcome, StoreError> {
        // Conditional update: a second signal never overwrites the first timestamp.
        let updated = sqlx::query(
            r#"
            UPDATE subscribers
            SET opted_out_at = $2
            WHERE phone_number = $1 AND opted_out_at IS NULL
            "#,
        )
        .bind(phone_number.as_ref())
        .bind(at)
        .execute(&self.db_pool)
        .await
        .map_err(StoreError::Write)?
        .rows_affected();

        if updated > 0 {
            return Ok(OptOutOutcome::Recorded(phone_number.clone()));
        }

        let exists = sqlx::query("SELECT 1 FROM subscribers WHERE phone_number = $1")
            .bind(phone_number.as_ref())
            .fetch_optional(&self.db_pool)
            .await
            .map_err(StoreError::Write)?
            .is_some();

        if exists {
            Ok(OptOutOutcome::AlreadyOptedOut(phone_number.clone()))
        } else {
            Ok(OptOutOutcome::UnknownSubscriber)
        }
    }
}

// Rows with an invalid phone number get no job.
fn parse_subscriber(row: &PgRow) -> Option<Subscriber> {
    let id: Uuid = row.get("id");

    match PhoneNumber::parse(row.get("phone_number")) {
        Ok(phone_number) => Some(Subscriber {
            id,
            phone_number,
            opted_out_at: row.get("opted_out_at"),
        }),
        Err(err) => {
            tracing::error!(
                subscriber_id = %id,
                "Subscriber left out of the broadcast, invalid phone number: {}",
                err
            );
            None
        }
    }
}
