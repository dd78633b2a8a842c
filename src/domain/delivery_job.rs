use uuid::Uuid;

use crate::domain::phone_number::PhoneNumber;

/// One SMS to one subscriber, as it travels through the delivery queue.
///
/// Serialized as `{"to": .., "from": .., "msg": .., "broadcast_id": ..}`.
/// Payloads without `broadcast_id` are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeliveryJob {
    pub to: PhoneNumber,
    pub from: PhoneNumber,
    #[serde(rename = "msg")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_id: Option<Uuid>,
}

impl DeliveryJob {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<DeliveryJob, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
