//! Fixtures shared by the billing handler tests.

use crate::domain::billing::{
    BillingCatalog, CheckoutCompleted, CheckoutMode, HandlerOutcome, InvoicePayment, Organization,
    OrganizationKind, ProviderEvent, ProviderEventKind, SubscriptionChange, SubscriptionTier,
    WebhookError, WebhookEventHandler,
};
use crate::domain::foundation::{Credits, OrganizationId, Timestamp};
use crate::adapters::memory::InMemoryBillingStore;
use crate::ports::BillingStore;

pub const TIER_2_PRICE: &str = "price_tier_2_monthly";

pub fn catalog() -> BillingCatalog {
    BillingCatalog::new(Credits::new(100))
        .with_bundle("bundle_500", Credits::new(500))
        .with_bundle("bundle_2000", Credits::new(2_000))
        .with_price("price_tier_1_monthly", SubscriptionTier::Tier1)
        .with_price(TIER_2_PRICE, SubscriptionTier::Tier2)
        .with_allotment(SubscriptionTier::Tier1, Credits::new(500))
        .with_allotment(SubscriptionTier::Tier2, Credits::new(1_500))
}

pub fn metered_org(id: i64) -> Organization {
    let mut org = Organization::new(
        OrganizationId::new(id),
        format!("Org {}", id),
        OrganizationKind::Metered,
    );
    org.billing_customer_id = Some(customer(id));
    org
}

pub fn customer(id: i64) -> String {
    format!("cus_{}", id)
}

fn event(id: &str, kind: ProviderEventKind) -> ProviderEvent {
    ProviderEvent {
        id: id.to_string(),
        created: Timestamp::now(),
        livemode: false,
        kind,
    }
}

pub fn checkout_event(id: &str, org_id: i64, bundle_id: Option<&str>) -> ProviderEvent {
    event(
        id,
        ProviderEventKind::CheckoutCompleted(CheckoutCompleted {
            session_id: format!("cs_{}", id),
            mode: CheckoutMode::Payment,
            paid: true,
            organization_id: Some(OrganizationId::new(org_id)),
            customer_id: Some(customer(org_id)),
            bundle_id: bundle_id.map(str::to_string),
            amount_total: Some(9_900),
            currency: Some("usd".to_string()),
            invoice_id: None,
        }),
    )
}

pub fn invoice(org_id: i64, price_id: Option<&str>, attempt_count: u32) -> InvoicePayment {
    InvoicePayment {
        invoice_id: format!("in_{}_{}", org_id, attempt_count),
        customer_id: customer(org_id),
        subscription_id: Some(format!("sub_{}", org_id)),
        price_id: price_id.map(str::to_string),
        amount_cents: 4_900,
        currency: Some("usd".to_string()),
        attempt_count,
        billing_reason: Some("subscription_cycle".to_string()),
    }
}

pub fn invoice_succeeded_event(id: &str, invoice: InvoicePayment) -> ProviderEvent {
    event(id, ProviderEventKind::InvoicePaymentSucceeded(invoice))
}

pub fn invoice_failed_event(id: &str, invoice: InvoicePayment) -> ProviderEvent {
    event(id, ProviderEventKind::InvoicePaymentFailed(invoice))
}

pub fn subscription(org_id: i64, price_id: Option<&str>, status: &str) -> SubscriptionChange {
    SubscriptionChange {
        subscription_id: format!("sub_{}", org_id),
        customer_id: customer(org_id),
        price_id: price_id.map(str::to_string),
        status: status.to_string(),
    }
}

pub fn subscription_created_event(id: &str, change: SubscriptionChange) -> ProviderEvent {
    event(id, ProviderEventKind::SubscriptionCreated(change))
}

pub fn subscription_updated_event(id: &str, change: SubscriptionChange) -> ProviderEvent {
    event(id, ProviderEventKind::SubscriptionUpdated(change))
}

pub fn subscription_deleted_event(id: &str, change: SubscriptionChange) -> ProviderEvent {
    event(id, ProviderEventKind::SubscriptionDeleted(change))
}

/// Runs a handler in its own transaction, committing only when applied.
pub async fn apply(
    handler: &dyn WebhookEventHandler,
    store: &InMemoryBillingStore,
    event: &ProviderEvent,
) -> Result<HandlerOutcome, WebhookError> {
    let mut tx = store.begin().await?;
    let result = handler.handle(tx.as_mut(), event).await;
    match &result {
        Ok(HandlerOutcome::Applied { .. }) => tx.commit().await?,
        _ => tx.rollback().await?,
    }
    result
}
