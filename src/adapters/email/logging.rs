use async_trait::async_trait;
use tracing::info;

use crate::ports::{Notifier, NotifierError};

/// Notifier that only writes a log line per message.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_notification_email(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotifierError> {
        info!(recipient = %recipient, subject = %subject, "Email delivery disabled, notification logged");
        Ok(())
    }
}
