//! SubscriptionCanceledHandler - cancellation sends metered
//! organizations into purgatory.

use async_trait::async_trait;
use tracing::info;

use super::lifecycle::{enter_purgatory, lock_organization};
use crate::domain::billing::{
    BillingEventType, BillingNotification, Claim, HandlerOutcome, IdempotencyGuard,
    NewBillingEvent, NotificationKind, ProviderEvent, ProviderEventKind, ProviderEventType,
    PurgatoryReason, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingTransaction, OrganizationLookup};

#[derive(Debug, Default)]
pub struct SubscriptionCanceledHandler;

impl SubscriptionCanceledHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionCanceledHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::SubscriptionDeleted]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::SubscriptionDeleted(change) = &event.kind else {
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
            BillingEventType::SubscriptionCanceled,
            &event.id,
            format!("Subscription {} canceled", change.subscription_id),
        );
        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        organization.change_tier(None);
        let mut outcome = HandlerOutcome::applied(organization.id);

        if organization.is_metered() {
            let reason = PurgatoryReason::SubscriptionCanceled;
            if enter_purgatory(tx, &mut organization, reason, &event.id).await? {
                outcome = outcome.with_notification(BillingNotification::new(
                    organization.id,
                    organization.name.clone(),
                    NotificationKind::Suspended { reason },
                ));
            }
        } else {
            info!(
                event_id = %event.id,
                organization_id = %organization.id,
                "Subscription canceled for unmetered organization"
            );
        }

        tx.update_organization(&organization).await?;
        Ok(outcome)
    }
}
