//! Resend Notifier - sends billing emails through the Resend HTTP API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::ports::{Notifier, NotifierError};

const RESEND_BASE_URL: &str = "https://api.resend.com";

/// Request body for `POST /emails`.
#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct ResendNotifier {
    client: Client,
    api_key: SecretString,
    from: String,
    base_url: String,
}

impl ResendNotifier {
    /// Creates a notifier sending as `from` (an RFC 5322 "Name <addr>" value).
    pub fn new(
        api_key: SecretString,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            from: from.into(),
            base_url: RESEND_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn emails_url(&self) -> String {
        format!("{}/emails", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send_notification_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError> {
        let email = ResendEmail {
            from: &self.from,
            to: [recipient],
            subject,
            text: body,
        };

        let response = self
            .client
            .post(self.emails_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&email)
            .send()
            .await
            .map_err(|e| NotifierError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(recipient = %recipient, subject = %subject, "Notification email sent");
        Ok(())
    }
}
