use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::domain::phone_number::PhoneNumber;

const OPT_OUT_TOKEN: &str = "stop";
// Format used by the gateway for `message-timestamp`.
const GATEWAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inbound message or status callback sent by the SMS gateway.
#[derive(Debug, Clone, Default)]
pub struct StatusNotification {
    pub content: Option<String>,
    pub keyword: Option<String>,
    pub msisdn: Option<String>,
    pub timestamp: Option<String>,
}

/// A validated request to opt a subscriber out.
#[derive(Debug, Clone)]
pub struct OptOutSignal {
    pub phone_number: PhoneNumber,
    pub at: DateTime<Utc>,
}

impl StatusNotification {
    pub fn is_opt_out(&self) -> bool {
        [&self.content, &self.keyword]
            .into_iter()
            .flatten()
            .any(|value| value.trim().eq_ignore_ascii_case(OPT_OUT_TOKEN))
    }

    pub fn opt_out_signal(&self) -> Result<OptOutSignal, String> {
        let msisdn = self
            .msisdn
            .clone()
            .ok_or_else(|| "msisdn is missing".to_string())?;
        let timestamp = self
            .timestamp
            .as_deref()
            .ok_or_else(|| "message-timestamp is missing".to_string())?;

        Ok(OptOutSignal {
            phone_number: PhoneNumber::parse(msisdn)?,
            at: parse_timestamp(timestamp)?,
        })
    }
}

/// Accepts unix seconds, the gateway's `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    let invalid = || format!("{} is not a valid timestamp", value);

    if let Ok(seconds) = value.parse::<i64>() {
        return Utc.timestamp_opt(seconds, 0).single().ok_or_else(invalid);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, GATEWAY_TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| invalid())
}
