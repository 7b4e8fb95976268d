//! InvoicePaymentFailedHandler - records failures and suspends
//! organizations that keep failing.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{enter_purgatory, lock_organization};
use crate::domain::billing::{
    BillingCatalog, BillingEventType, BillingNotification, Claim, HandlerOutcome,
    IdempotencyGuard, NewBillingEvent, NotificationKind, ProviderEvent, ProviderEventKind,
    ProviderEventType, PurgatoryReason, WebhookError, WebhookEventHandler,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingTransaction, OrganizationLookup};

/// Suspends an organization once failures reach the configured
/// threshold inside the trailing window, or the provider's attempt
/// counter passes its limit. Earlier failures only warn.
pub struct InvoicePaymentFailedHandler {
    catalog: Arc<BillingCatalog>,
}

impl InvoicePaymentFailedHandler {
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentFailedHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::InvoicePaymentFailed]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::InvoicePaymentFailed(invoice) = &event.kind else {
            return Err(WebhookError::ParseError(format!(
                "expected failed invoice, got {}",
                event.event_type()
            )));
        };

        let mut organization =
            lock_organization(tx, OrganizationLookup::ByCustomer(invoice.customer_id.clone()))
                .await?;

        let row = NewBillingEvent::new(
            organization.id,
            BillingEventType::PaymentFailed,
            &event.id,
            format!(
                "Payment failed, invoice {} attempt {}",
                invoice.invoice_id, invoice.attempt_count
            ),
        )
        .with_amount(Some(invoice.amount_cents), invoice.currency.clone())
        .with_invoice(&invoice.invoice_id);

        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        let outcome = HandlerOutcome::applied(organization.id);

        if organization.is_in_purgatory() {
            info!(
                event_id = %event.id,
                organization_id = %organization.id,
                attempt_count = invoice.attempt_count,
                "Payment failed for organization already in purgatory"
            );
            return Ok(outcome);
        }

        let policy = self.catalog.purgatory_policy();
        let failures = tx
            .count_billing_events_since(
                organization.id,
                BillingEventType::PaymentFailed,
                policy.window_start(Timestamp::now()),
            )
            .await?;

        if !policy.should_suspend(failures, invoice.attempt_count) {
            info!(
                event_id = %event.id,
                organization_id = %organization.id,
                failures_in_window = failures,
                attempt_count = invoice.attempt_count,
                "Payment failed, warning administrators"
            );
            return Ok(outcome.with_notification(BillingNotification::new(
                organization.id,
                organization.name.clone(),
                NotificationKind::PaymentWarning {
                    attempt_count: invoice.attempt_count,
                },
            )));
        }

        let reason = PurgatoryReason::PaymentFailed;
        enter_purgatory(tx, &mut organization, reason, &event.id).await?;
        tx.update_organization(&organization).await?;

        Ok(outcome.with_notification(BillingNotification::new(
            organization.id,
            organization.name.clone(),
            NotificationKind::Suspended { reason },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{
        NewPurgatoryEvent, OrganizationStatus, PurgatoryPolicy, RelationshipStatus,
    };
    use crate::domain::foundation::OrganizationId;

    fn handler() -> InvoicePaymentFailedHandler {
        InvoicePaymentFailedHandler::new(Arc::new(catalog()))
    }

    fn earlier_failure(org_id: i64, event_id: &str) -> NewBillingEvent {
        NewBillingEvent::new(
            OrganizationId::new(org_id),
            BillingEventType::PaymentFailed,
            event_id,
            "Payment failed",
        )
    }

    fn notification_kinds(outcome: &HandlerOutcome) -> Vec<NotificationKind> {
        match outcome {
            HandlerOutcome::Applied { notifications, .. } => {
                notifications.iter().map(|n| n.kind.clone()).collect()
            }
            HandlerOutcome::Duplicate => Vec::new(),
        }
    }

    #[tokio::test]
    async fn second_failure_in_window_suspends_organization() {
        let c = OrganizationId::new(3);
        let store = InMemoryBillingStore::new()
            .with_organization(metered_org(3))
            .with_organization(metered_org(30))
            .with_relationship(c, OrganizationId::new(30))
            .with_billing_event(
                earlier_failure(3, "evt_fail_1"),
                Timestamp::now().minus_days(10),
            );

        let outcome = apply(
            &handler(),
            &store,
            &invoice_failed_event("evt_fail_2", invoice(3, Some(TIER_2_PRICE), 2)),
        )
        .await
        .unwrap();

        let org = store.organization(c).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Purgatory);
        let episodes = store.purgatory_events().await;
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].reason, PurgatoryReason::PaymentFailed);
        assert_eq!(episodes[0].triggered_by, "evt_fail_2");
        assert_eq!(
            store.relationships().await[0].status,
            RelationshipStatus::Purgatory
        );
        assert_eq!(
            notification_kinds(&outcome),
            vec![NotificationKind::Suspended {
                reason: PurgatoryReason::PaymentFailed
            }]
        );
    }

    #[tokio::test]
    async fn first_failure_only_warns() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));

        let outcome = apply(
            &handler(),
            &store,
            &invoice_failed_event("evt_fail_1", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Active);
        assert!(store.purgatory_events().await.is_empty());
        let rows = store.billing_events().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, BillingEventType::PaymentFailed);
        assert_eq!(
            notification_kinds(&outcome),
            vec![NotificationKind::PaymentWarning { attempt_count: 1 }]
        );
    }

    #[tokio::test]
    async fn failures_outside_window_are_not_counted() {
        let store = InMemoryBillingStore::new()
            .with_organization(metered_org(1))
            .with_billing_event(earlier_failure(1, "evt_old"), Timestamp::now().minus_days(40));

        apply(
            &handler(),
            &store,
            &invoice_failed_event("evt_fail_new", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Active);
    }

    #[tokio::test]
    async fn attempt_count_above_limit_suspends_on_first_recorded_failure() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));

        apply(
            &handler(),
            &store,
            &invoice_failed_event("evt_fail", invoice(1, Some(TIER_2_PRICE), 3)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Purgatory);
    }

    #[tokio::test]
    async fn custom_threshold_is_honored() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));
        let policy = PurgatoryPolicy {
            failure_threshold: 1,
            ..PurgatoryPolicy::default()
        };
        let handler =
            InvoicePaymentFailedHandler::new(Arc::new(catalog().with_purgatory_policy(policy)));

        apply(
            &handler,
            &store,
            &invoice_failed_event("evt_fail", invoice(1, None, 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Purgatory);
    }

    #[tokio::test]
    async fn failure_while_suspended_does_not_open_second_episode() {
        let mut org = metered_org(1);
        org.status = OrganizationStatus::Purgatory;
        let store = InMemoryBillingStore::new()
            .with_organization(org)
            .with_active_purgatory(NewPurgatoryEvent {
                organization_id: OrganizationId::new(1),
                reason: PurgatoryReason::PaymentFailed,
                triggered_by: "evt_first".to_string(),
            });

        let outcome = apply(
            &handler(),
            &store,
            &invoice_failed_event("evt_again", invoice(1, None, 4)),
        )
        .await
        .unwrap();

        assert_eq!(store.purgatory_events().await.len(), 1);
        assert_eq!(store.billing_events().await.len(), 1);
        assert!(notification_kinds(&outcome).is_empty());
    }

    #[tokio::test]
    async fn redelivered_failure_is_counted_once() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));
        let event = invoice_failed_event("evt_fail", invoice(1, None, 1));

        apply(&handler(), &store, &event).await.unwrap();
        let second = apply(&handler(), &store, &event).await.unwrap();

        assert_eq!(second, HandlerOutcome::Duplicate);
        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Active);
    }
}
