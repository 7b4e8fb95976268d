//! Notifier port - outbound billing notifications.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification rejected by provider ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Sends a single email. Callers treat every failure as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError>;
}
