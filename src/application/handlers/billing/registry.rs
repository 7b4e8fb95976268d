//! Routes provider event types to their billing handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    CheckoutCompletedHandler, InvoicePaymentFailedHandler, InvoicePaymentSucceededHandler,
    SubscriptionCanceledHandler, SubscriptionCreatedHandler, SubscriptionUpdatedHandler,
};
use crate::domain::billing::{
    BillingCatalog, ProviderEventType, WebhookDispatcher, WebhookEventHandler,
};

/// Dispatcher holding one handler per supported provider event type.
pub struct BillingHandlerRegistry {
    handlers: Vec<Box<dyn WebhookEventHandler>>,
    routes: HashMap<ProviderEventType, usize>,
}

impl BillingHandlerRegistry {
    /// Registers the full billing handler set against `catalog`.
    pub fn new(catalog: Arc<BillingCatalog>) -> Self {
        Self::empty()
            .register(Box::new(CheckoutCompletedHandler::new(catalog.clone())))
            .register(Box::new(InvoicePaymentSucceededHandler::new(catalog.clone())))
            .register(Box::new(InvoicePaymentFailedHandler::new(catalog.clone())))
            .register(Box::new(SubscriptionCreatedHandler::new(catalog.clone())))
            .register(Box::new(SubscriptionUpdatedHandler::new(catalog)))
            .register(Box::new(SubscriptionCanceledHandler::new()))
    }

    fn empty() -> Self {
        Self {
            handlers: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Adds a handler; later registrations win for overlapping types.
    pub fn register(mut self, handler: Box<dyn WebhookEventHandler>) -> Self {
        let index = self.handlers.len();
        for event_type in handler.handles() {
            self.routes.insert(event_type, index);
        }
        self.handlers.push(handler);
        self
    }

    pub fn supported_types(&self) -> Vec<ProviderEventType> {
        self.routes.keys().copied().collect()
    }
}

impl WebhookDispatcher for BillingHandlerRegistry {
    fn get_handler(&self, event_type: &ProviderEventType) -> Option<&dyn WebhookEventHandler> {
        self.routes
            .get(event_type)
            .and_then(|&index| self.handlers.get(index))
            .map(|handler| handler.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{
        HandlerOutcome, ProviderEvent, ProviderEventKind, WebhookError,
    };
    use crate::domain::foundation::{Credits, OrganizationId, Timestamp};
    use crate::ports::BillingStore;

    fn registry() -> BillingHandlerRegistry {
        BillingHandlerRegistry::new(Arc::new(catalog()))
    }

    #[test]
    fn every_supported_type_has_a_handler() {
        let registry = registry();
        for event_type in [
            ProviderEventType::CheckoutCompleted,
            ProviderEventType::InvoicePaymentSucceeded,
            ProviderEventType::InvoicePaymentFailed,
            ProviderEventType::SubscriptionCreated,
            ProviderEventType::SubscriptionUpdated,
            ProviderEventType::SubscriptionDeleted,
        ] {
            assert!(registry.get_handler(&event_type).is_some(), "{}", event_type);
        }
        assert_eq!(registry.supported_types().len(), 6);
        assert!(registry.get_handler(&ProviderEventType::Unsupported).is_none());
    }

    #[tokio::test]
    async fn dispatch_routes_to_matching_handler() {
        let store = InMemoryBillingStore::new().with_organization(metered_org(1));
        let registry = registry();

        let mut tx = store.begin().await.unwrap();
        let outcome = registry
            .dispatch(tx.as_mut(), &checkout_event("evt_a", 1, Some("bundle_2000")))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(outcome, HandlerOutcome::Applied { .. }));
        let org = store.organization(OrganizationId::new(1)).await.unwrap();
        assert_eq!(org.credit_balance, Credits::new(2_000));
    }

    #[tokio::test]
    async fn unsupported_event_is_ignored() {
        let store = InMemoryBillingStore::new();
        let event = ProviderEvent {
            id: "evt_other".to_string(),
            created: Timestamp::now(),
            livemode: false,
            kind: ProviderEventKind::Unsupported("customer.created".to_string()),
        };

        let mut tx = store.begin().await.unwrap();
        let result = registry().dispatch(tx.as_mut(), &event).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
    }
}
