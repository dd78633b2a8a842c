use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::phone_number::PhoneNumber;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub phone_number: PhoneNumber,
    pub opted_out_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(phone_number: PhoneNumber) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number,
            opted_out_at: None,
        }
    }

    pub fn is_opted_out(&self) -> bool {
        self.opted_out_at.is_some()
    }
}
