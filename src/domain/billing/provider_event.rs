//! Canonical payment-provider events.
//!
//! Handlers never look at raw provider JSON. The verifier decodes the
//! envelope and converts the object for the event kinds the ledger cares
//! about into the typed variants below.

use serde::Serialize;
use std::fmt;

use crate::domain::foundation::{OrganizationId, Timestamp};

use super::stripe_objects::{
    Expandable, StripeCheckoutSession, StripeEvent, StripeInvoice, StripeSubscription,
};
use super::webhook_errors::WebhookError;

/// Event kinds the ledger routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventType {
    CheckoutCompleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Unsupported,
}

impl ProviderEventType {
    /// Parses a Stripe event type string.
    ///
    /// `invoice.paid` is deliberately not mapped: Stripe sends it alongside
    /// `invoice.payment_succeeded` for the same invoice under a different
    /// event id, which would apply the renewal twice.
    pub fn from_stripe(s: &str) -> Self {
        match s {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                Self::CheckoutCompleted
            }
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout_completed",
            Self::InvoicePaymentSucceeded => "invoice_payment_succeeded",
            Self::InvoicePaymentFailed => "invoice_payment_failed",
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionDeleted => "subscription_deleted",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ProviderEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkout session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// One-off purchase, used for credit bundles.
    Payment,
    Subscription,
    Setup,
}

/// A completed checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub mode: CheckoutMode,
    /// False while an asynchronous payment method is still pending.
    pub paid: bool,
    /// Organization named in metadata or `client_reference_id`.
    pub organization_id: Option<OrganizationId>,
    pub customer_id: Option<String>,
    pub bundle_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub invoice_id: Option<String>,
}

/// A paid or failed invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoicePayment {
    pub invoice_id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    /// Price of the first line item.
    pub price_id: Option<String>,
    /// Amount paid for successes, amount due for failures.
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub attempt_count: u32,
    pub billing_reason: Option<String>,
}

impl InvoicePayment {
    pub fn is_subscription(&self) -> bool {
        self.subscription_id.is_some()
    }
}

/// A subscription lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    /// Provider-side status, informational only.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "object", rename_all = "snake_case")]
pub enum ProviderEventKind {
    CheckoutCompleted(CheckoutCompleted),
    InvoicePaymentSucceeded(InvoicePayment),
    InvoicePaymentFailed(InvoicePayment),
    SubscriptionCreated(SubscriptionChange),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    /// Carries the raw provider type string.
    Unsupported(String),
}

/// A verified provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEvent {
    /// Provider's unique event id; the idempotency key.
    pub id: String,
    pub created: Timestamp,
    pub livemode: bool,
    pub kind: ProviderEventKind,
}

impl ProviderEvent {
    pub fn event_type(&self) -> ProviderEventType {
        match &self.kind {
            ProviderEventKind::CheckoutCompleted(_) => ProviderEventType::CheckoutCompleted,
            ProviderEventKind::InvoicePaymentSucceeded(_) => {
                ProviderEventType::InvoicePaymentSucceeded
            }
            ProviderEventKind::InvoicePaymentFailed(_) => ProviderEventType::InvoicePaymentFailed,
            ProviderEventKind::SubscriptionCreated(_) => ProviderEventType::SubscriptionCreated,
            ProviderEventKind::SubscriptionUpdated(_) => ProviderEventType::SubscriptionUpdated,
            ProviderEventKind::SubscriptionDeleted(_) => ProviderEventType::SubscriptionDeleted,
            ProviderEventKind::Unsupported(_) => ProviderEventType::Unsupported,
        }
    }

    /// Converts a decoded Stripe envelope.
    ///
    /// Unsupported event types are accepted without inspecting the object.
    pub fn from_stripe(event: StripeEvent) -> Result<Self, WebhookError> {
        let created = Timestamp::from_unix(event.created)
            .ok_or_else(|| WebhookError::ParseError("invalid created timestamp".to_string()))?;

        let kind = match ProviderEventType::from_stripe(&event.event_type) {
            ProviderEventType::CheckoutCompleted => {
                ProviderEventKind::CheckoutCompleted(checkout_from(parse_object(&event)?)?)
            }
            ProviderEventType::InvoicePaymentSucceeded => {
                let invoice: StripeInvoice = parse_object(&event)?;
                let amount = invoice.amount_paid;
                ProviderEventKind::InvoicePaymentSucceeded(invoice_from(invoice, amount)?)
            }
            ProviderEventType::InvoicePaymentFailed => {
                let invoice: StripeInvoice = parse_object(&event)?;
                let amount = invoice.amount_due;
                ProviderEventKind::InvoicePaymentFailed(invoice_from(invoice, amount)?)
            }
            ProviderEventType::SubscriptionCreated => {
                ProviderEventKind::SubscriptionCreated(subscription_from(parse_object(&event)?))
            }
            ProviderEventType::SubscriptionUpdated => {
                ProviderEventKind::SubscriptionUpdated(subscription_from(parse_object(&event)?))
            }
            ProviderEventType::SubscriptionDeleted => {
                ProviderEventKind::SubscriptionDeleted(subscription_from(parse_object(&event)?))
            }
            ProviderEventType::Unsupported => ProviderEventKind::Unsupported(event.event_type.clone()),
        };

        Ok(Self {
            id: event.id,
            created,
            livemode: event.livemode,
            kind,
        })
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> Result<T, WebhookError> {
    event.deserialize_object().map_err(|e| {
        WebhookError::ParseError(format!("{} object: {}", event.event_type, e))
    })
}

fn checkout_from(session: StripeCheckoutSession) -> Result<CheckoutCompleted, WebhookError> {
    let mode = match session.mode.as_str() {
        "payment" => CheckoutMode::Payment,
        "subscription" => CheckoutMode::Subscription,
        "setup" => CheckoutMode::Setup,
        other => {
            return Err(WebhookError::ParseError(format!(
                "unknown checkout mode '{}'",
                other
            )))
        }
    };

    let organization_id = session
        .metadata
        .get("organization_id")
        .or(session.client_reference_id.as_ref())
        .map(|raw| {
            raw.parse::<OrganizationId>().map_err(|_| {
                WebhookError::ParseError(format!("invalid organization reference '{}'", raw))
            })
        })
        .transpose()?;

    Ok(CheckoutCompleted {
        paid: session.payment_status.as_deref() != Some("unpaid"),
        mode,
        organization_id,
        customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
        bundle_id: session.metadata.get("bundle_id").cloned(),
        amount_total: session.amount_total,
        currency: session.currency,
        invoice_id: session.invoice.as_ref().map(|i| i.id().to_string()),
        session_id: session.id,
    })
}

fn invoice_from(invoice: StripeInvoice, amount_cents: i64) -> Result<InvoicePayment, WebhookError> {
    let customer_id = invoice
        .customer
        .as_ref()
        .map(|c| c.id().to_string())
        .ok_or(WebhookError::MissingField("customer"))?;

    Ok(InvoicePayment {
        subscription_id: invoice.subscription_id().map(str::to_string),
        price_id: invoice.first_price_id().map(str::to_string),
        customer_id,
        amount_cents,
        currency: invoice.currency,
        attempt_count: invoice.attempt_count,
        billing_reason: invoice.billing_reason,
        invoice_id: invoice.id,
    })
}

fn subscription_from(subscription: StripeSubscription) -> SubscriptionChange {
    SubscriptionChange {
        price_id: subscription.first_price_id().map(str::to_string),
        customer_id: Expandable::id(&subscription.customer).to_string(),
        status: subscription.status,
        subscription_id: subscription.id,
    }
}
