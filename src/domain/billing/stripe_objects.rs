//! Stripe wire types.
//!
//! Only the fields the billing handlers read are captured; everything else
//! in Stripe's payloads is ignored. These types are decoded once at the
//! boundary and converted into [`ProviderEvent`](super::ProviderEvent).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stripe webhook envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "invoice.payment_failed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp at which the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Deserializes the data object as the specified type.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data.object)
    }
}

/// A reference that Stripe may send either as an id or as the expanded object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

/// Checkout session (`checkout.session.*` events).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    pub id: String,

    #[serde(default)]
    pub customer: Option<Expandable>,

    #[serde(default)]
    pub client_reference_id: Option<String>,

    /// "payment", "subscription" or "setup".
    pub mode: String,

    /// "paid", "unpaid" or "no_payment_required".
    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub invoice: Option<Expandable>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Price reference carried by invoice lines and subscription items.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,
}

/// Paginated list wrapper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// Invoice line item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoiceLine {
    #[serde(default)]
    pub price: Option<StripePrice>,

    /// Newer API versions nest the price under `pricing.price_details`.
    #[serde(default)]
    pub pricing: Option<StripeLinePricing>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeLinePricing {
    #[serde(default)]
    pub price_details: Option<StripePriceDetails>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePriceDetails {
    pub price: String,
}

impl StripeInvoiceLine {
    pub fn price_id(&self) -> Option<&str> {
        self.price.as_ref().map(|p| p.id.as_str()).or_else(|| {
            self.pricing
                .as_ref()
                .and_then(|p| p.price_details.as_ref())
                .map(|d| d.price.as_str())
        })
    }
}

/// Invoice (`invoice.*` events).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    pub id: String,

    #[serde(default)]
    pub customer: Option<Expandable>,

    #[serde(default)]
    pub subscription: Option<Expandable>,

    /// Newer API versions move the subscription under `parent`.
    #[serde(default)]
    pub parent: Option<StripeInvoiceParent>,

    #[serde(default)]
    pub amount_paid: i64,

    #[serde(default)]
    pub amount_due: i64,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub attempt_count: u32,

    #[serde(default)]
    pub billing_reason: Option<String>,

    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLine>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

impl StripeInvoice {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Expandable::id).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| d.subscription.as_ref())
                .map(Expandable::id)
        })
    }

    /// Price of the first line item.
    pub fn first_price_id(&self) -> Option<&str> {
        self.lines.data.first().and_then(StripeInvoiceLine::price_id)
    }
}

/// Subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub price: StripePrice,
}

/// Subscription (`customer.subscription.*` events).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    pub id: String,

    pub customer: Expandable,

    /// "active", "past_due", "unpaid", "canceled", ...
    pub status: String,

    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
}

impl StripeSubscription {
    pub fn first_price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}
