//! Notifier that records messages instead of sending them.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{Notifier, NotifierError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<SentNotification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Delivery("recording notifier set to fail".to_string()));
        }
        self.sent.write().await.push(SentNotification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
