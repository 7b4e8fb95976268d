//! InvoicePaymentSucceededHandler - renewals, one-off charges, and
//! reactivation out of purgatory.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::lifecycle::{exit_purgatory, lock_organization, tier_for_price};
use crate::domain::billing::{
    BillingCatalog, BillingEventType, BillingNotification, Claim, HandlerOutcome,
    IdempotencyGuard, InvoicePayment, NewBillingEvent, NotificationKind, Organization,
    ProviderEvent, ProviderEventKind, ProviderEventType, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingTransaction, OrganizationLookup};

pub struct InvoicePaymentSucceededHandler {
    catalog: Arc<BillingCatalog>,
}

impl InvoicePaymentSucceededHandler {
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self { catalog }
    }

    /// Applies the tier allotment for a paid subscription invoice.
    ///
    /// The invoice's price decides the tier and is recorded on the
    /// organization; the stored tier is the fallback. Credits stay untouched
    /// when neither resolves.
    fn replenish(
        &self,
        organization: &mut Organization,
        invoice: &InvoicePayment,
        event_id: &str,
    ) -> Result<(), WebhookError> {
        let tier = match tier_for_price(&self.catalog, invoice.price_id.as_deref(), event_id) {
            Some(tier) => {
                let previous_tier = organization.subscription_tier;
                if organization.change_tier(Some(tier)) {
                    info!(
                        event_id = %event_id,
                        organization_id = %organization.id,
                        previous_tier = ?previous_tier,
                        tier = %tier,
                        "Subscription tier taken from invoice price"
                    );
                }
                Some(tier)
            }
            None => {
                warn!(
                    event_id = %event_id,
                    organization_id = %organization.id,
                    stored_tier = ?organization.subscription_tier,
                    "Falling back to stored subscription tier"
                );
                organization.subscription_tier
            }
        };

        let Some(tier) = tier else {
            warn!(
                event_id = %event_id,
                organization_id = %organization.id,
                "No subscription tier resolved, credits unchanged"
            );
            return Ok(());
        };

        let Some(allotment) = self.catalog.allotment_for(tier) else {
            warn!(
                event_id = %event_id,
                organization_id = %organization.id,
                tier = %tier,
                "No credit allotment configured for tier, credits unchanged"
            );
            return Ok(());
        };

        let previous = organization.credit_balance;
        let policy = self.catalog.renewal_policy();
        let new_balance = organization.replenish(allotment, policy)?;

        info!(
            event_id = %event_id,
            organization_id = %organization.id,
            tier = %tier,
            allotment = %allotment,
            policy = ?policy,
            previous_balance = %previous,
            new_balance = %new_balance,
            "Subscription credits replenished"
        );
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentSucceededHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::InvoicePaymentSucceeded]
    }

    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let ProviderEventKind::InvoicePaymentSucceeded(invoice) = &event.kind else {
            return Err(WebhookError::ParseError(format!(
                "expected paid invoice, got {}",
                event.event_type()
            )));
        };

        let mut organization =
            lock_organization(tx, OrganizationLookup::ByCustomer(invoice.customer_id.clone()))
                .await?;

        let (event_type, description) = if invoice.is_subscription() {
            (
                BillingEventType::SubscriptionPayment,
                format!("Subscription payment, invoice {}", invoice.invoice_id),
            )
        } else {
            (
                BillingEventType::Charge,
                format!("One-off charge, invoice {}", invoice.invoice_id),
            )
        };
        let row = NewBillingEvent::new(organization.id, event_type, &event.id, description)
            .with_amount(Some(invoice.amount_cents), invoice.currency.clone())
            .with_invoice(&invoice.invoice_id);

        if let Claim::AlreadyApplied = IdempotencyGuard::claim(tx, &row).await? {
            return Ok(HandlerOutcome::Duplicate);
        }

        if invoice.is_subscription() && organization.is_metered() {
            self.replenish(&mut organization, invoice, &event.id)?;
        }

        let mut outcome = HandlerOutcome::applied(organization.id);
        if exit_purgatory(tx, &mut organization, &event.id).await? {
            outcome = outcome.with_notification(BillingNotification::new(
                organization.id,
                organization.name.clone(),
                NotificationKind::Reactivated,
            ));
        }

        tx.update_organization(&organization).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{
        NewPurgatoryEvent, OrganizationKind, OrganizationStatus, PurgatoryReason,
        PurgatoryStatus, RelationshipStatus, RenewalPolicy, SubscriptionTier,
    };
    use crate::domain::foundation::{Credits, OrganizationId};
    use proptest::prelude::*;

    fn handler() -> InvoicePaymentSucceededHandler {
        InvoicePaymentSucceededHandler::new(Arc::new(catalog()))
    }

    fn suspended_org(id: i64) -> Organization {
        let mut org = metered_org(id);
        org.status = OrganizationStatus::Purgatory;
        org.subscription_tier = Some(SubscriptionTier::Tier2);
        org
    }

    #[tokio::test]
    async fn renewal_reactivates_suspended_organization() {
        let b = OrganizationId::new(2);
        let partner = OrganizationId::new(20);
        let store = InMemoryBillingStore::new()
            .with_organization(suspended_org(2))
            .with_organization(metered_org(20))
            .with_relationship(b, partner)
            .with_active_purgatory(NewPurgatoryEvent {
                organization_id: b,
                reason: PurgatoryReason::PaymentFailed,
                triggered_by: "evt_fail_2".to_string(),
            });

        let outcome = apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_renew", invoice(2, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(b).await.unwrap();
        assert_eq!(org.status, OrganizationStatus::Active);
        assert_eq!(org.credit_balance, Credits::new(1_500));
        let episodes = store.purgatory_events().await;
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].status, PurgatoryStatus::Resolved);
        assert!(store
            .relationships()
            .await
            .iter()
            .all(|r| r.status == RelationshipStatus::Active));
        assert!(matches!(
            outcome,
            HandlerOutcome::Applied { ref notifications, .. }
                if notifications[0].kind == NotificationKind::Reactivated
        ));
    }

    #[tokio::test]
    async fn relationship_stays_suspended_while_counterpart_is_in_purgatory() {
        let store = InMemoryBillingStore::new()
            .with_organization(suspended_org(2))
            .with_organization(suspended_org(3))
            .with_relationship(OrganizationId::new(2), OrganizationId::new(3));

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_renew", invoice(2, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let rels = store.relationships().await;
        assert_eq!(rels[0].status, RelationshipStatus::Purgatory);
    }

    #[tokio::test]
    async fn subscription_invoice_writes_subscription_payment_row() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let rows = store.billing_events().await;
        assert_eq!(rows[0].event_type, BillingEventType::SubscriptionPayment);
        assert_eq!(rows[0].amount_cents, Some(4_900));
        assert_eq!(rows[0].provider_invoice_id.as_deref(), Some("in_1_1"));
    }

    #[tokio::test]
    async fn one_off_invoice_is_a_charge_without_replenishment() {
        let mut org = metered_org(1);
        org.credit_balance = Credits::new(42);
        let store = InMemoryBillingStore::new().with_organization(org);
        let mut one_off = invoice(1, Some(TIER_2_PRICE), 1);
        one_off.subscription_id = None;

        apply(&handler(), &store, &invoice_succeeded_event("evt_1", one_off))
            .await
            .unwrap();

        let rows = store.billing_events().await;
        assert_eq!(rows[0].event_type, BillingEventType::Charge);
        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(42));
    }

    #[tokio::test]
    async fn unmetered_organization_is_not_replenished() {
        let mut org = metered_org(1);
        org.kind = OrganizationKind::Unmetered;
        let store = InMemoryBillingStore::new().with_organization(org);

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::ZERO);
    }

    #[tokio::test]
    async fn unknown_price_falls_back_to_stored_tier() {
        let mut org = metered_org(1);
        org.subscription_tier = Some(SubscriptionTier::Tier1);
        let store = InMemoryBillingStore::new().with_organization(org);

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, Some("price_legacy"), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(500));
    }

    #[tokio::test]
    async fn invoice_price_replaces_stale_stored_tier() {
        let mut org = metered_org(1);
        org.subscription_tier = Some(SubscriptionTier::Tier1);
        let store = InMemoryBillingStore::new().with_organization(org);

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();
        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_2", invoice(1, None, 2)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.subscription_tier, Some(SubscriptionTier::Tier2));
        assert_eq!(org.credit_balance, Credits::new(1_500));
    }

    #[tokio::test]
    async fn no_resolvable_tier_leaves_credits_but_still_records_payment() {
        let mut org = metered_org(1);
        org.credit_balance = Credits::new(7);
        let store = InMemoryBillingStore::new().with_organization(org);

        apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, None, 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(7));
        assert_eq!(store.billing_events().await.len(), 1);
    }

    #[tokio::test]
    async fn accumulate_policy_keeps_unspent_credits() {
        let mut org = metered_org(1);
        org.credit_balance = Credits::new(300);
        let store = InMemoryBillingStore::new().with_organization(org);
        let handler = InvoicePaymentSucceededHandler::new(Arc::new(
            catalog().with_renewal_policy(RenewalPolicy::Accumulate),
        ));

        apply(
            &handler,
            &store,
            &invoice_succeeded_event("evt_1", invoice(1, Some(TIER_2_PRICE), 1)),
        )
        .await
        .unwrap();

        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(1_800));
    }

    #[tokio::test]
    async fn duplicate_renewal_is_applied_once() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));
        let handler = InvoicePaymentSucceededHandler::new(Arc::new(
            catalog().with_renewal_policy(RenewalPolicy::Accumulate),
        ));
        let event = invoice_succeeded_event("evt_1", invoice(1, Some(TIER_2_PRICE), 1));

        apply(&handler, &store, &event).await.unwrap();
        let second = apply(&handler, &store, &event).await.unwrap();

        assert_eq!(second, HandlerOutcome::Duplicate);
        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(1_500));
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let store = InMemoryBillingStore::new();

        let result = apply(
            &handler(),
            &store,
            &invoice_succeeded_event("evt_1", invoice(5, Some(TIER_2_PRICE), 1)),
        )
        .await;

        assert!(matches!(result, Err(WebhookError::OrganizationNotFound(_))));
    }

    proptest! {
        #[test]
        fn renewal_matches_policy(start in 0u64..1_000_000_000, accumulate in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let policy = if accumulate { RenewalPolicy::Accumulate } else { RenewalPolicy::Reset };
                let mut org = metered_org(1);
                org.credit_balance = Credits::new(start);
                let store = InMemoryBillingStore::new().with_organization(org);
                let handler = InvoicePaymentSucceededHandler::new(Arc::new(
                    catalog().with_renewal_policy(policy),
                ));

                apply(&handler, &store, &invoice_succeeded_event("evt_p", invoice(1, Some(TIER_2_PRICE), 1)))
                    .await
                    .unwrap();

                let balance = store.organization(OrganizationId::new(1)).await.unwrap().credit_balance;
                let expected = if accumulate { start + 1_500 } else { 1_500 };
                assert_eq!(balance.value(), expected);
            });
        }
    }
}
