//! Response bodies for the webhook endpoint.

use serde::Serialize;

use crate::domain::billing::WebhookResult;

/// Acknowledgement returned with every 200 response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    pub result: &'static str,
}

impl From<WebhookResult> for WebhookAck {
    fn from(result: WebhookResult) -> Self {
        let result = match result {
            WebhookResult::Processed => "processed",
            WebhookResult::AlreadyProcessed => "already_processed",
            WebhookResult::Ignored => "ignored",
        };
        Self {
            received: true,
            result,
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
