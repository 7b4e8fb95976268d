use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{lock_organization, tier_for_price};
use crate::domain::billing::{
    BillingCatalog, BillingEventType, Claim, HandlerOutcome, IdempotencyGuard, NewBillingEvent,
    ProviderEvent, ProviderEventKind, ProviderEventType, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingTransaction, OrganizationLookup};

/// Tracks plan changes. Provider-side statuses such as `past_due` are
/// logged only; suspension is driven by invoice failures.
pub struct SubscriptionUpdatedHandler {
    catalog: Arc<BillingCatalog>,
}

impl SubscriptionUpdatedHandler {
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionUpdatedHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::SubscriptionUpdated]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::SubscriptionUpdated(change) = &event.kind else {
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
            BillingEventType::SubscriptionUpdated,
            &event.id,
            format!("Subscription {} updated ({})", change.subscription_id, change.status),
        );
        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        let previous = organization.subscription_tier;
        let tier = tier_for_price(&self.catalog, change.price_id.as_deref(), &event.id);
        if let Some(tier) = tier {
            if organization.change_tier(Some(tier)) {
                tx.update_organization(&organization).await?;
                info!(
                    event_id = %event.id,
                    organization_id = %organization.id,
                    previous_tier = ?previous,
                    tier = %tier,
                    "Subscription tier changed"
                );
            }
        }

        info!(
            event_id = %event.id,
            organization_id = %organization.id,
            subscription_id = %change.subscription_id,
            provider_status = %change.status,
            "Subscription updated"
        );

        Ok(HandlerOutcome::applied(organization.id))
    }
}
