//! Payment provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::billing::{StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

/// Stripe webhook settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Webhook endpoint signing secret (`whsec_...`)
    pub stripe_webhook_secret: SecretString,

    /// Maximum age of a signed delivery, in seconds
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    /// Reject test-mode events (production endpoints)
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    /// Builds the webhook verifier these settings describe.
    pub fn verifier(&self) -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(self.stripe_webhook_secret.clone())
            .with_tolerance_secs(self.signature_tolerance_secs)
            .with_require_livemode(self.require_livemode)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.stripe_webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.signature_tolerance_secs <= 0 || self.signature_tolerance_secs > 3600 {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        Ok(())
    }
}

fn default_signature_tolerance() -> i64 {
    DEFAULT_TOLERANCE_SECS
}
