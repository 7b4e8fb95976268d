//! Webhook processor - applies verified provider events exactly once.
//!
//! ## Flow
//!
//! 1. Verify the delivery (signature, timestamp) and decode it
//! 2. Skip events that already have a ledger row (fast path)
//! 3. Open a transaction and dispatch to the handler for the event type
//! 4. Commit, then send the notifications the handler produced
//!
//! Any handler error rolls the whole transaction back, so no partial state
//! is ever visible. The ledger insert inside the handler is the
//! authoritative idempotency check; a concurrent duplicate that slips past
//! the fast path is caught there and acknowledged.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::idempotency::IdempotencyGuard;
use super::notification::{BillingNotification, NotificationDispatcher};
use super::provider_event::{ProviderEvent, ProviderEventType};
use super::webhook_errors::WebhookError;
use crate::domain::foundation::OrganizationId;
use crate::ports::{
    BillingStore, BillingTransaction, DeadLetterEntry, DeadLetterSink, PaymentEventVerifier,
};

/// What a handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// State changed; commit and notify.
    Applied {
        organization_id: OrganizationId,
        notifications: Vec<BillingNotification>,
    },
    /// The ledger already holds this event.
    Duplicate,
}

impl HandlerOutcome {
    pub fn applied(organization_id: OrganizationId) -> Self {
        HandlerOutcome::Applied {
            organization_id,
            notifications: Vec::new(),
        }
    }

    pub fn with_notification(self, notification: BillingNotification) -> Self {
        match self {
            HandlerOutcome::Applied {
                organization_id,
                mut notifications,
            } => {
                notifications.push(notification);
                HandlerOutcome::Applied {
                    organization_id,
                    notifications,
                }
            }
            HandlerOutcome::Duplicate => HandlerOutcome::Duplicate,
        }
    }
}

/// Result of processing a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    Processed,
    AlreadyProcessed,
    /// Acknowledged without any state change.
    Ignored,
}

/// Handler for one or more provider event types.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// Returns the event type(s) this handler processes.
    fn handles(&self) -> Vec<ProviderEventType>;

    /// Applies the event inside `tx`.
    ///
    /// Returns `Err(WebhookError::Ignored(_))` if the event should be
    /// acknowledged without changes.
    async fn handle(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError>;
}

/// Routes events to handlers.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    fn get_handler(&self, event_type: &ProviderEventType) -> Option<&dyn WebhookEventHandler>;

    /// Returns `Err(WebhookError::Ignored)` if no handler is registered.
    async fn dispatch(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &ProviderEvent,
    ) -> Result<HandlerOutcome, WebhookError> {
        let event_type = event.event_type();
        match self.get_handler(&event_type) {
            Some(handler) => handler.handle(tx, event).await,
            None => Err(WebhookError::Ignored(format!(
                "No handler for event type: {}",
                event_type
            ))),
        }
    }
}

pub struct BillingEventProcessor {
    verifier: Arc<dyn PaymentEventVerifier>,
    store: Arc<dyn BillingStore>,
    dispatcher: Arc<dyn WebhookDispatcher>,
    dead_letters: Arc<dyn DeadLetterSink>,
    notifications: NotificationDispatcher,
}

impl BillingEventProcessor {
    pub fn new(
        verifier: Arc<dyn PaymentEventVerifier>,
        store: Arc<dyn BillingStore>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        dead_letters: Arc<dyn DeadLetterSink>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            verifier,
            store,
            dispatcher,
            dead_letters,
            notifications,
        }
    }

    /// Verifies and processes a raw webhook delivery.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookResult, WebhookError> {
        let event = self.verifier.verify_event(payload, signature).map_err(|e| {
            warn!(error = %e, "Rejected webhook delivery");
            e
        })?;
        self.process(event).await
    }

    /// Applies a verified event exactly once.
    pub async fn process(&self, event: ProviderEvent) -> Result<WebhookResult, WebhookError> {
        let event_type = event.event_type();

        if IdempotencyGuard::already_applied(self.store.as_ref(), &event.id).await? {
            info!(event_id = %event.id, %event_type, "Event already processed");
            return Ok(WebhookResult::AlreadyProcessed);
        }

        let mut tx = self.store.begin().await?;
        let outcome = self.dispatcher.dispatch(tx.as_mut(), &event).await;

        match outcome {
            Ok(HandlerOutcome::Applied {
                organization_id,
                notifications,
            }) => {
                tx.commit().await?;
                info!(
                    event_id = %event.id,
                    %event_type,
                    %organization_id,
                    "Billing event applied"
                );
                self.notifications.dispatch(&notifications).await;
                Ok(WebhookResult::Processed)
            }
            Ok(HandlerOutcome::Duplicate) => {
                rollback(tx, &event.id).await;
                info!(event_id = %event.id, %event_type, "Event already processed");
                Ok(WebhookResult::AlreadyProcessed)
            }
            Err(WebhookError::Ignored(reason)) => {
                rollback(tx, &event.id).await;
                info!(event_id = %event.id, %event_type, reason = %reason, "Event ignored");
                Ok(WebhookResult::Ignored)
            }
            Err(e) => {
                rollback(tx, &event.id).await;
                if e.is_unmatched() {
                    self.dead_letter(&event, &e).await;
                } else {
                    warn!(
                        event_id = %event.id,
                        %event_type,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Billing event failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn dead_letter(&self, event: &ProviderEvent, err: &WebhookError) {
        let payload = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        let entry = DeadLetterEntry {
            provider_event_id: event.id.clone(),
            event_type: event.event_type().to_string(),
            reason: err.to_string(),
            payload,
        };

        match self.dead_letters.record(entry).await {
            Ok(attempts) => error!(
                event_id = %event.id,
                event_type = %event.event_type(),
                attempts,
                error = %err,
                "Billing event dead-lettered"
            ),
            Err(sink_err) => error!(
                event_id = %event.id,
                error = %err,
                sink_error = %sink_err,
                "Billing event failed and could not be dead-lettered"
            ),
        }
    }
}

async fn rollback(tx: Box<dyn BillingTransaction>, event_id: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(event_id = %event_id, error = %e, "Rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAdminDirectory, InMemoryBillingStore, RecordingNotifier};
    use crate::domain::billing::{
        BillingEventType, NewBillingEvent, NotificationKind, ProviderEventKind,
    };
    use crate::domain::foundation::Timestamp;
    use crate::ports::OrganizationLookup;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ══════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ══════════════════════════════════════════════════════════════

    /// Writes a ledger row for org 1 and counts invocations.
    struct CountingHandler {
        calls: AtomicU32,
        fail_with_not_found: bool,
    }

    #[async_trait]
    impl WebhookEventHandler for CountingHandler {
        fn handles(&self) -> Vec<ProviderEventType> {
            vec![ProviderEventType::InvoicePaymentFailed]
        }

        async fn handle(
            &self,
            tx: &mut dyn BillingTransaction,
            event: &ProviderEvent,
        ) -> Result<HandlerOutcome, WebhookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lookup = OrganizationLookup::ById(OrganizationId::new(1));
            let org = tx.lock_organization(&lookup).await?;
            if self.fail_with_not_found {
                return Err(WebhookError::OrganizationNotFound(lookup.to_string()));
            }
            let org = org.ok_or_else(|| WebhookError::OrganizationNotFound(lookup.to_string()))?;

            let row = NewBillingEvent::new(org.id, BillingEventType::PaymentFailed, &event.id, "x");
            if let crate::ports::InsertOutcome::Duplicate = tx.insert_billing_event(&row).await? {
                return Ok(HandlerOutcome::Duplicate);
            }
            Ok(HandlerOutcome::applied(org.id).with_notification(BillingNotification::new(
                org.id,
                org.name.clone(),
                NotificationKind::PaymentWarning { attempt_count: 1 },
            )))
        }
    }

    struct SingleDispatcher {
        handler: CountingHandler,
    }

    #[async_trait]
    impl WebhookDispatcher for SingleDispatcher {
        fn get_handler(&self, event_type: &ProviderEventType) -> Option<&dyn WebhookEventHandler> {
            if self.handler.handles().contains(event_type) {
                Some(&self.handler)
            } else {
                None
            }
        }
    }

    /// Verifier that accepts anything and yields a fixed event.
    struct StaticVerifier(ProviderEvent);

    impl PaymentEventVerifier for StaticVerifier {
        fn verify_event(&self, _: &[u8], signature: &str) -> Result<ProviderEvent, WebhookError> {
            if signature == "bad" {
                return Err(WebhookError::InvalidSignature);
            }
            Ok(self.0.clone())
        }
    }

    fn failed_invoice_event(id: &str) -> ProviderEvent {
        ProviderEvent {
            id: id.to_string(),
            created: Timestamp::now(),
            livemode: false,
            kind: ProviderEventKind::InvoicePaymentFailed(crate::domain::billing::InvoicePayment {
                invoice_id: "in_1".to_string(),
                customer_id: "cus_1".to_string(),
                subscription_id: Some("sub_1".to_string()),
                price_id: None,
                amount_cents: 4900,
                currency: Some("usd".to_string()),
                attempt_count: 1,
                billing_reason: None,
            }),
        }
    }

    struct Harness {
        processor: BillingEventProcessor,
        store: Arc<InMemoryBillingStore>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: Arc<SingleDispatcher>,
    }

    fn harness(fail_with_not_found: bool) -> Harness {
        let store = Arc::new(InMemoryBillingStore::new().with_organization(
            crate::domain::billing::Organization::new(
                OrganizationId::new(1),
                "Acme",
                crate::domain::billing::OrganizationKind::Metered,
            ),
        ));
        let notifier = Arc::new(RecordingNotifier::new());
        let directory =
            Arc::new(InMemoryAdminDirectory::new().with_admin(OrganizationId::new(1), "a@acme.test"));
        let dispatcher = Arc::new(SingleDispatcher {
            handler: CountingHandler {
                calls: AtomicU32::new(0),
                fail_with_not_found,
            },
        });
        let processor = BillingEventProcessor::new(
            Arc::new(StaticVerifier(failed_invoice_event("evt_1"))),
            store.clone(),
            dispatcher.clone(),
            store.clone(),
            NotificationDispatcher::new(directory, notifier.clone()),
        );
        Harness {
            processor,
            store,
            notifier,
            dispatcher,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Processing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn processes_new_event_and_notifies_after_commit() {
        let h = harness(false);

        let result = h.processor.process(failed_invoice_event("evt_1")).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        assert_eq!(h.store.billing_events().await.len(), 1);
        assert_eq!(h.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn redelivery_is_skipped_without_calling_handler() {
        let h = harness(false);

        h.processor.process(failed_invoice_event("evt_1")).await.unwrap();
        let result = h.processor.process(failed_invoice_event("evt_1")).await.unwrap();

        assert_eq!(result, WebhookResult::AlreadyProcessed);
        assert_eq!(h.dispatcher.handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.billing_events().await.len(), 1);
        assert_eq!(h.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn unhandled_event_type_is_ignored() {
        let h = harness(false);
        let event = ProviderEvent {
            kind: ProviderEventKind::Unsupported("charge.refunded".to_string()),
            ..failed_invoice_event("evt_2")
        };

        let result = h.processor.process(event).await.unwrap();

        assert_eq!(result, WebhookResult::Ignored);
        assert!(h.store.billing_events().await.is_empty());
    }

    #[tokio::test]
    async fn organization_not_found_is_dead_lettered_and_retryable() {
        let h = harness(true);

        let first = h.processor.process(failed_invoice_event("evt_orphan")).await;
        let second = h.processor.process(failed_invoice_event("evt_orphan")).await;

        assert!(matches!(first, Err(WebhookError::OrganizationNotFound(_))));
        assert!(second.as_ref().err().map(|e| e.is_retryable()).unwrap_or(false));
        let dead = h.store.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert!(h.store.billing_events().await.is_empty());
    }

    #[tokio::test]
    async fn failed_commit_surfaces_database_error_and_skips_notifications() {
        let h = harness(false);
        h.store.fail_next_commit();

        let result = h.processor.process(failed_invoice_event("evt_1")).await;

        assert!(matches!(result, Err(WebhookError::Database(_))));
        assert!(h.store.billing_events().await.is_empty());
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn handle_webhook_rejects_bad_signature_before_touching_state() {
        let h = harness(false);

        let result = h.processor.handle_webhook(b"{}", "bad").await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
        assert_eq!(h.dispatcher.handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn with_notification_on_duplicate_stays_duplicate() {
        let outcome = HandlerOutcome::Duplicate.with_notification(BillingNotification::new(
            OrganizationId::new(1),
            "Acme",
            NotificationKind::Reactivated,
        ));
        assert_eq!(outcome, HandlerOutcome::Duplicate);
    }
}
