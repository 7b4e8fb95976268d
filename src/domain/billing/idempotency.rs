//! Idempotent claiming of provider events.
//!
//! The ledger row for an event is inserted before any other effect. The
//! unique provider event id turns a redelivery into a no-op: the insert
//! returns nothing and the handler backs out before touching the
//! organization.

use tracing::debug;

use super::ledger::{BillingEvent, NewBillingEvent};
use crate::domain::foundation::DomainError;
use crate::ports::{BillingStore, BillingTransaction, InsertOutcome};

/// Outcome of claiming an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First time this event is seen; the ledger row is written.
    Fresh(BillingEvent),
    /// The event was applied by an earlier delivery.
    AlreadyApplied,
}

pub struct IdempotencyGuard;

impl IdempotencyGuard {
    /// Claims the event by writing its ledger row inside `tx`.
    pub async fn claim(
        tx: &mut dyn BillingTransaction,
        event: &NewBillingEvent,
    ) -> Result<Claim, DomainError> {
        match tx.insert_billing_event(event).await? {
            InsertOutcome::Inserted(row) => Ok(Claim::Fresh(row)),
            InsertOutcome::Duplicate => {
                debug!(
                    event_id = %event.provider_event_id,
                    organization_id = %event.organization_id,
                    "Ledger row already exists, event already applied"
                );
                Ok(Claim::AlreadyApplied)
            }
        }
    }

    /// Cheap pre-transaction check.
    pub async fn already_applied(
        store: &dyn BillingStore,
        provider_event_id: &str,
    ) -> Result<bool, DomainError> {
        store.is_event_applied(provider_event_id).await
    }
}
