use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::domain::status_notification::StatusNotification;
use crate::opt_out::{handle_status, OptOutError};
use crate::store::SubscriberStore;

/// Query string of the gateway's inbound message webhook.
#[derive(Deserialize, Debug)]
pub struct Parameters {
    pub text: Option<String>,
    pub keyword: Option<String>,
    pub msisdn: Option<String>,
    #[serde(rename = "message-timestamp")]
    pub message_timestamp: Option<String>,
}

#[derive(serde::Serialize)]
struct UpdateResponse<'a> {
    update: &'a str,
}

impl From<Parameters> for StatusNotification {
    fn from(parameters: Parameters) -> Self {
        StatusNotification {
            content: parameters.text,
            keyword: parameters.keyword,
            msisdn: parameters.msisdn,
            timestamp: parameters.message_timestamp,
        }
    }
}

#[tracing::instrument(
    name = "Inbound status notification",
    skip(parameters, store),
    fields(
        msisdn = ?parameters.msisdn,
        keyword = ?parameters.keyword
    )
)]
pub async fn handle_update(
    parameters: web::Query<Parameters>,
    store: web::Data<dyn SubscriberStore>,
) -> Result<HttpResponse, OptOutError> {
    let notification: StatusNotification = parameters.into_inner().into();
    let outcome = handle_status(store.get_ref(), &notification).await?;

    let response = match outcome.updated() {
        Some(number) => HttpResponse::Ok().json(UpdateResponse {
            update: number.as_ref(),
        }),
        None => HttpResponse::NoContent().finish(),
    };

    Ok(response)
}

impl ResponseError for OptOutError {
    fn status_code(&self) -> StatusCode {
        match self {
            OptOutError::InvalidNotification(_) => StatusCode::BAD_REQUEST,
            OptOutError::StoreWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
