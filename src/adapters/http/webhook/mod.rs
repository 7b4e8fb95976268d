//! HTTP adapter for payment-provider webhooks.
//!
//! - `POST /api/webhooks/stripe` - Apply a Stripe event
//! - `GET /health` - Liveness probe

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, WebhookAck};
pub use handlers::{WebhookApiError, WebhookAppState, STRIPE_SIGNATURE_HEADER};
pub use routes::webhook_router;
