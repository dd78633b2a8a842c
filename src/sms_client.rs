use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::domain::phone_number::PhoneNumber;
use crate::error_chain_fmt;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);
// The gateway reports per-message success with status "0".
const ACCEPTED_STATUS: &str = "0";

pub struct SmsClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
    api_secret: Secret<String>,
}

#[derive(serde::Serialize)]
struct SendSmsBody<'a> {
    api_key: &'a str,
    api_secret: &'a str,
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct SendSmsResponse {
    #[serde(default)]
    messages: Vec<SendSmsMessageStatus>,
}

#[derive(serde::Deserialize)]
struct SendSmsMessageStatus {
    status: String,
    #[serde(rename = "error-text", default)]
    error_text: Option<String>,
}

#[derive(thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to reach the SMS gateway.")]
    Transport(#[from] reqwest::Error),
    #[error("The SMS gateway rejected the message with status {status}: {error_text}")]
    Rejected { status: String, error_text: String },
}

impl std::fmt::Debug for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl SmsClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        api_secret: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> Result<SmsClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(SmsClient {
            http_client,
            base_url,
            api_key,
            api_secret,
        })
    }

    pub async fn send_sms(
        &self,
        from: &PhoneNumber,
        to: &PhoneNumber,
        text: &str,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/sms/json", self.base_url);
        let body = SendSmsBody {
            api_key: self.api_key.expose_secret(),
            api_secret: self.api_secret.expose_secret(),
            from: from.as_ref(),
            to: to.as_ref(),
            text,
        };

        let response: SendSmsResponse = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()? // return an error when server response status code is 4xx or 5xx
            .json()
            .await?;

        // A 200 response can still carry a per-message rejection.
        match response
            .messages
            .into_iter()
            .find(|message| message.status != ACCEPTED_STATUS)
        {
            Some(rejected) => Err(GatewayError::Rejected {
                status: rejected.status,
                error_text: rejected.error_text.unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }
}
