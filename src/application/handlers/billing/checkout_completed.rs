//! CheckoutCompletedHandler - credits a purchased bundle or links a new
//! subscriber to its billing customer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::lifecycle::lock_organization;
use crate::domain::billing::{
    BillingCatalog, BillingEventType, BillingNotification, CheckoutCompleted, CheckoutMode, Claim,
    HandlerOutcome, IdempotencyGuard, NewBillingEvent, NotificationKind, Organization,
    ProviderEvent, ProviderEventKind, ProviderEventType, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingTransaction, OrganizationLookup};

/// Handles completed checkout sessions.
///
/// One-off checkouts credit a bundle. Subscription checkouts only attach the
/// billing customer; their money movement arrives as invoice events.
pub struct CheckoutCompletedHandler {
    catalog: Arc<BillingCatalog>,
}

impl CheckoutCompletedHandler {
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self { catalog }
    }

    async fn top_up(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
        checkout: &CheckoutCompleted,
    ) -> Result<HandlerOutcome, WebhookError> {
        if !checkout.paid {
            return Err(WebhookError::Ignored(format!(
                "checkout session {} payment still pending",
                checkout.session_id
            )));
        }

        let mut organization = lock_organization(tx, organization_lookup(checkout)?).await?;

        let bundle = self.catalog.credits_for_bundle(checkout.bundle_id.as_deref());
        if bundle.is_fallback() {
            warn!(
                event_id = %event.id,
                organization_id = %organization.id,
                bundle_id = ?checkout.bundle_id,
                credits = %bundle.credits(),
                "Unknown credit bundle, applying default amount"
            );
        }
        let credits = bundle.credits();

        let mut row = NewBillingEvent::new(
            organization.id,
            BillingEventType::TopUp,
            &event.id,
            format!("Credit top-up: {} credits", credits),
        )
        .with_amount(checkout.amount_total, checkout.currency.clone());
        if let Some(invoice_id) = &checkout.invoice_id {
            row = row.with_invoice(invoice_id);
        }

        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        if let Some(customer) = &checkout.customer_id {
            attach_customer(&mut organization, customer);
        }

        let previous = organization.credit_balance;
        let new_balance = organization.add_credits(credits)?;
        tx.update_organization(&organization).await?;

        info!(
            event_id = %event.id,
            organization_id = %organization.id,
            credits = %credits,
            previous_balance = %previous,
            new_balance = %new_balance,
            "Credits topped up"
        );

        Ok(HandlerOutcome::applied(organization.id).with_notification(
            BillingNotification::new(
                organization.id,
                organization.name.clone(),
                NotificationKind::TopUpReceived {
                    credits,
                    new_balance,
                },
            ),
        ))
    }

    /// Later invoice and subscription events find the organization by
    /// customer, so the link must be stored before they arrive.
    async fn link_subscriber(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
        checkout: &CheckoutCompleted,
    ) -> Result<HandlerOutcome, WebhookError> {
        let Some(customer) = &checkout.customer_id else {
            return Err(WebhookError::Ignored(format!(
                "subscription checkout {} has no customer",
                checkout.session_id
            )));
        };

        let mut organization = lock_organization(tx, organization_lookup(checkout)?).await?;

        let row = NewBillingEvent::new(
            organization.id,
            BillingEventType::SubscriptionCreated,
            &event.id,
            format!("Subscription checkout completed for customer {}", customer),
        )
        .with_amount(checkout.amount_total, checkout.currency.clone());

        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        if attach_customer(&mut organization, customer) {
            tx.update_organization(&organization).await?;
        } else if organization.billing_customer_id.as_deref() != Some(customer.as_str()) {
            warn!(
                event_id = %event.id,
                organization_id = %organization.id,
                stored_customer = ?organization.billing_customer_id,
                checkout_customer = %customer,
                "Subscription checkout names a different customer than the one on file"
            );
        }

        Ok(HandlerOutcome::applied(organization.id))
    }
}

fn organization_lookup(checkout: &CheckoutCompleted) -> Result<OrganizationLookup, WebhookError> {
    match (checkout.organization_id, &checkout.customer_id) {
        (Some(id), _) => Ok(OrganizationLookup::ById(id)),
        (None, Some(customer)) => Ok(OrganizationLookup::ByCustomer(customer.clone())),
        (None, None) => Err(WebhookError::MissingMetadata("organization_id")),
    }
}

fn attach_customer(organization: &mut Organization, customer: &str) -> bool {
    let attached = organization.attach_customer(customer);
    if attached {
        info!(
            organization_id = %organization.id,
            customer_id = %customer,
            "Attached billing customer to organization"
        );
    }
    attached
}

#[async_trait]
impl WebhookEventHandler for CheckoutCompletedHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::CheckoutCompleted]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::CheckoutCompleted(checkout) = &event.kind else {
            return Err(WebhookError::ParseError(format!(
                "expected checkout session, got {}",
                event.event_type()
            )));
        };

        match checkout.mode {
            CheckoutMode::Payment => self.top_up(tx, event, checkout).await,
            CheckoutMode::Subscription => self.link_subscriber(tx, event, checkout).await,
            CheckoutMode::Setup => Err(WebhookError::Ignored(format!(
                "checkout session {} only collects payment details",
                checkout.session_id
            ))),
        }
    }
}
