use crate::domain::phone_number::PhoneNumber;

/// Sender number and text wrapping shared by every message of a broadcast.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BroadcastSettings {
    pub from_number: PhoneNumber,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl BroadcastSettings {
    pub fn compose(&self, text: &str) -> String {
        let mut body = String::with_capacity(self.prefix.len() + text.len() + self.suffix.len());

        body.push_str(&self.prefix);
        body.push_str(text);
        body.push_str(&self.suffix);

        body
    }
}
