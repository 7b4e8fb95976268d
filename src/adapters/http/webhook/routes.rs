//! Axum router configuration for the webhook endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{handle_stripe_webhook, health, WebhookAppState};

/// Create the webhook router.
///
/// # Routes
/// - `POST /api/webhooks/stripe` - Stripe events, authenticated by signature
/// - `GET /health` - Liveness probe
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new()
        .route("/api/webhooks/stripe", post(handle_stripe_webhook))
        .route("/health", get(health))
}
