use actix_web::http::StatusCode;
use actix_web::{web, Either, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::broadcast::{broadcast, BroadcastError, ResolutionFailurePolicy};
use crate::queue::DeliveryQueue;
use crate::store::SubscriberStore;

/// Upper bound for a `/send` body, JSON or form encoded. Well above what any
/// gateway accepts once the message is split into parts.
pub const MAX_SEND_BODY_BYTES: usize = 1024 * 1024;

#[derive(Deserialize, Debug)]
pub struct SendBody {
    pub msg: String,
}

#[derive(serde::Serialize)]
struct SendResponse {
    sent: bool,
}

/// Accepts a broadcast and returns once every job is queued, not delivered.
#[tracing::instrument(
    name = "Trigger a broadcast",
    skip(body, store, queue, policy),
    fields(message_length = tracing::field::Empty)
)]
pub async fn handle_send(
    body: Either<web::Json<SendBody>, web::Form<SendBody>>,
    store: web::Data<dyn SubscriberStore>,
    queue: web::Data<dyn DeliveryQueue>,
    policy: web::Data<ResolutionFailurePolicy>,
) -> Result<HttpResponse, BroadcastError> {
    let text = match body {
        Either::Left(json) => json.into_inner().msg,
        Either::Right(form) => form.into_inner().msg,
    };
    tracing::Span::current().record("message_length", text.len());

    broadcast(
        store.get_ref(),
        queue.into_inner(),
        &text,
        *policy.get_ref(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(SendResponse { sent: true }))
}

impl ResponseError for BroadcastError {
    fn status_code(&self) -> StatusCode {
        match self {
            BroadcastError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(SendResponse { sent: false })
    }
}
