//! Billing event ledger rows.
//!
//! The ledger is append-only. Each row is keyed by the provider's event id,
//! which doubles as the idempotency key: a given provider event produces at
//! most one row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{BillingEventId, OrganizationId, Timestamp, ValidationError};

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    /// One-off credit bundle purchase.
    TopUp,
    /// Paid subscription invoice.
    SubscriptionPayment,
    /// Paid invoice that is not tied to a subscription.
    Charge,
    PaymentFailed,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::TopUp => "top_up",
            BillingEventType::SubscriptionPayment => "subscription_payment",
            BillingEventType::Charge => "charge",
            BillingEventType::PaymentFailed => "payment_failed",
            BillingEventType::SubscriptionCreated => "subscription_created",
            BillingEventType::SubscriptionUpdated => "subscription_updated",
            BillingEventType::SubscriptionCanceled => "subscription_canceled",
        }
    }
}

impl FromStr for BillingEventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_up" => Ok(BillingEventType::TopUp),
            "subscription_payment" => Ok(BillingEventType::SubscriptionPayment),
            "charge" => Ok(BillingEventType::Charge),
            "payment_failed" => Ok(BillingEventType::PaymentFailed),
            "subscription_created" => Ok(BillingEventType::SubscriptionCreated),
            "subscription_updated" => Ok(BillingEventType::SubscriptionUpdated),
            "subscription_canceled" => Ok(BillingEventType::SubscriptionCanceled),
            other => Err(ValidationError::invalid_format(
                "event_type",
                format!("unknown billing event type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBillingEvent {
    pub organization_id: OrganizationId,
    pub event_type: BillingEventType,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub provider_event_id: String,
    pub provider_invoice_id: Option<String>,
    pub description: String,
}

impl NewBillingEvent {
    pub fn new(
        organization_id: OrganizationId,
        event_type: BillingEventType,
        provider_event_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            organization_id,
            event_type,
            amount_cents: None,
            currency: None,
            provider_event_id: provider_event_id.into(),
            provider_invoice_id: None,
            description: description.into(),
        }
    }

    pub fn with_amount(mut self, amount_cents: Option<i64>, currency: Option<String>) -> Self {
        self.amount_cents = amount_cents;
        self.currency = currency.map(|c| c.to_lowercase());
        self
    }

    pub fn with_invoice(mut self, invoice_id: impl Into<String>) -> Self {
        self.provider_invoice_id = Some(invoice_id.into());
        self
    }

    /// Materializes the row as stored.
    pub fn into_record(self, id: BillingEventId, created_at: Timestamp) -> BillingEvent {
        BillingEvent {
            id,
            organization_id: self.organization_id,
            event_type: self.event_type,
            amount_cents: self.amount_cents,
            currency: self.currency,
            provider_event_id: self.provider_event_id,
            provider_invoice_id: self.provider_invoice_id,
            description: self.description,
            created_at,
        }
    }
}

/// A persisted, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingEvent {
    pub id: BillingEventId,
    pub organization_id: OrganizationId,
    pub event_type: BillingEventType,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub provider_event_id: String,
    pub provider_invoice_id: Option<String>,
    pub description: String,
    pub created_at: Timestamp,
}
