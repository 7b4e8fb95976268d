//! PaymentEventVerifier port - authenticating inbound provider events.

use crate::domain::billing::{ProviderEvent, WebhookError};

/// Authenticates a raw webhook delivery and decodes it.
///
/// Implementations must verify against the raw bytes before parsing and
/// must not touch any state.
pub trait PaymentEventVerifier: Send + Sync {
    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<ProviderEvent, WebhookError>;
}
