use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entities::order::PaymentStatus;
use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::AppState;

pub fn payments_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub order_token: String,
    pub payment_status: PaymentStatus,
}

/// Payment provider callback.
///
/// The body is taken raw because the HMAC signature covers the exact
/// bytes sent, not a re-serialized form.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = crate::services::payments::PaymentNotification,
    responses(
        (status = 200, description = "Notification applied", body = crate::ApiResponse<WebhookAck>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let timestamp = headers.get("x-timestamp").and_then(|v| v.to_str().ok());
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());

    let order = state
        .services
        .payments
        .process_notification(timestamp, signature, &body)
        .await?;

    Ok(success_response(WebhookAck {
        order_token: order.token,
        payment_status: order.payment_status,
    }))
}
