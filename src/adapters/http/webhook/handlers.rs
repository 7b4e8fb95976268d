//! HTTP handlers for the payment-provider webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::domain::billing::{BillingEventProcessor, WebhookError};

use super::dto::{ErrorResponse, WebhookAck};

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookAppState {
    pub processor: Arc<BillingEventProcessor>,
}

impl WebhookAppState {
    pub fn new(processor: Arc<BillingEventProcessor>) -> Self {
        Self { processor }
    }
}

/// POST /api/webhooks/stripe - Apply a Stripe webhook event
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn handle_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookApiError::MissingSignature)?;

    let result = state.processor.handle_webhook(&body, signature).await?;

    Ok((StatusCode::OK, Json(WebhookAck::from(result))))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts webhook errors to HTTP responses.
#[derive(Debug)]
pub enum WebhookApiError {
    MissingSignature,
    Webhook(WebhookError),
}

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WebhookApiError::MissingSignature => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(
                    "missing_signature",
                    format!("Missing {} header", STRIPE_SIGNATURE_HEADER),
                ),
            ),
            // Internal details stay in the logs; the provider only needs the status.
            WebhookApiError::Webhook(err) if err.status_code().is_server_error() => (
                err.status_code(),
                ErrorResponse::new(err.kind(), "Event could not be processed, retry later"),
            ),
            WebhookApiError::Webhook(err) => {
                (err.status_code(), ErrorResponse::new(err.kind(), err.to_string()))
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: WebhookApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn missing_signature_is_bad_request() {
        assert_eq!(status_of(WebhookApiError::MissingSignature), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn forged_signature_is_unauthorized() {
        assert_eq!(
            status_of(WebhookError::InvalidSignature.into()),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn unknown_organization_asks_for_retry() {
        assert_eq!(
            status_of(WebhookError::OrganizationNotFound("customer cus_1".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn malformed_payload_is_bad_request() {
        assert_eq!(
            status_of(WebhookError::ParseError("bad json".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
