use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{lock_organization, tier_for_price};
use crate::domain::billing::{
    BillingCatalog, BillingEventType, Claim, HandlerOutcome, IdempotencyGuard, NewBillingEvent,
    ProviderEvent, ProviderEventKind, ProviderEventType, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingTransaction, OrganizationLookup};

/// Records a new subscription and its tier. Credits arrive with the
/// first paid invoice, and lifecycle status is left alone.
pub struct SubscriptionCreatedHandler {
    catalog: Arc<BillingCatalog>,
}

impl SubscriptionCreatedHandler {
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionCreatedHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::SubscriptionCreated]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::SubscriptionCreated(change) = &event.kind else {
            return Err(WebhookError::ParseError(format!(
                "expected subscription, got {}",
                event.event_type()
            )));
        };

        let mut organization =
            lock_organization(tx, OrganizationLookup::ByCustomer(change.customer_id.clone()))
                .await?;

        let row = NewBillingEvent::new(
            organization.id,
            BillingEventType::SubscriptionCreated,
            &event.id,
            format!("Subscription {} created ({})", change.subscription_id, change.status),
        );
        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        if let Some(tier) = tier_for_price(&self.catalog, change.price_id.as_deref(), &event.id) {
            if organization.change_tier(Some(tier)) {
                tx.update_organization(&organization).await?;
            }
            info!(
                event_id = %event.id,
                organization_id = %organization.id,
                subscription_id = %change.subscription_id,
                tier = %tier,
                "Subscription created"
            );
        }

        Ok(HandlerOutcome::applied(organization.id))
    }
}
