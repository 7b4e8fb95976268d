//! Webhook processing errors.
//!
//! Every failure while verifying or applying a provider event maps to one
//! of these variants. The HTTP status decides whether the provider retries.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the signature tolerance.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Test-mode event delivered to a live-only endpoint.
    #[error("Livemode mismatch")]
    LivemodeMismatch,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata field missing from webhook event.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// No organization matches the event's references.
    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    /// Attempted state transition is not valid.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Crediting would overflow the balance.
    #[error("Credit overflow: {0}")]
    CreditOverflow(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::OrganizationNotFound(_)
        )
    }

    /// Returns true if the event could not be tied to any organization.
    ///
    /// These events are kept in the dead-letter table for manual review.
    pub fn is_unmatched(&self) -> bool {
        matches!(
            self,
            WebhookError::OrganizationNotFound(_) | WebhookError::MissingMetadata(_)
        )
    }

    /// Maps the error to an HTTP status code.
    ///
    /// - 2xx: Event acknowledged, no retry
    /// - 4xx: Client error, no retry
    /// - 5xx: Server error, will retry
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::InvalidTimestamp
            | WebhookError::LivemodeMismatch
            | WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::OrganizationNotFound(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::CreditOverflow(_)
            | WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short stable label for logs and dead-letter rows.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::InvalidSignature => "invalid_signature",
            WebhookError::TimestampOutOfRange => "timestamp_out_of_range",
            WebhookError::InvalidTimestamp => "invalid_timestamp",
            WebhookError::LivemodeMismatch => "livemode_mismatch",
            WebhookError::ParseError(_) => "parse_error",
            WebhookError::MissingMetadata(_) => "missing_metadata",
            WebhookError::MissingField(_) => "missing_field",
            WebhookError::OrganizationNotFound(_) => "organization_not_found",
            WebhookError::InvalidTransition(_) => "invalid_transition",
            WebhookError::CreditOverflow(_) => "credit_overflow",
            WebhookError::Ignored(_) => "ignored",
            WebhookError::Database(_) => "database",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::OrganizationNotFound => WebhookError::OrganizationNotFound(err.message),
            ErrorCode::InvalidStateTransition => WebhookError::InvalidTransition(err.message),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}

impl From<ValidationError> for WebhookError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::CreditOverflow { .. } => WebhookError::CreditOverflow(err.to_string()),
            other => WebhookError::InvalidTransition(other.to_string()),
        }
    }
}
