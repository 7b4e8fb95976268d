//! BillingStore port - transactional access to billing state.
//!
//! Every provider event is applied inside exactly one [`BillingTransaction`].
//! The transaction owns the organization row lock from the moment a handler
//! calls [`BillingTransaction::lock_organization`] until commit or rollback,
//! so concurrent events for the same organization are applied one at a time.
//!
//! Dropping a transaction without committing rolls it back.

use async_trait::async_trait;
use std::fmt;

use crate::domain::billing::{
    BillingEvent, BillingEventType, NewBillingEvent, NewPurgatoryEvent, Organization,
    PurgatoryEvent,
};
use crate::domain::foundation::{DomainError, OrganizationId, PurgatoryEventId, Timestamp};

/// How a handler identifies the organization an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizationLookup {
    ById(OrganizationId),
    ByCustomer(String),
}

impl fmt::Display for OrganizationLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrganizationLookup::ById(id) => write!(f, "organization {}", id),
            OrganizationLookup::ByCustomer(customer) => write!(f, "customer {}", customer),
        }
    }
}

/// Result of inserting a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(BillingEvent),
    /// A row with the same provider event id already exists.
    Duplicate,
}

/// Opens billing transactions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Begins a transaction.
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError>;

    /// Non-locking check whether a provider event already has a ledger row.
    ///
    /// A fast path only; the insert inside the transaction is authoritative.
    async fn is_event_applied(&self, provider_event_id: &str) -> Result<bool, DomainError>;
}

/// One unit of atomic work against billing state.
#[async_trait]
pub trait BillingTransaction: Send {
    /// Loads and row-locks an organization.
    async fn lock_organization(
        &mut self,
        lookup: &OrganizationLookup,
    ) -> Result<Option<Organization>, DomainError>;

    /// Writes back the mutable organization columns.
    async fn update_organization(&mut self, organization: &Organization) -> Result<(), DomainError>;

    /// Appends a ledger row unless one with the same provider event id exists.
    async fn insert_billing_event(
        &mut self,
        event: &NewBillingEvent,
    ) -> Result<InsertOutcome, DomainError>;

    /// Counts ledger rows of `event_type` created at or after `since`.
    async fn count_billing_events_since(
        &mut self,
        organization_id: OrganizationId,
        event_type: BillingEventType,
        since: Timestamp,
    ) -> Result<u64, DomainError>;

    async fn find_active_purgatory(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<Option<PurgatoryEvent>, DomainError>;

    /// Opens a suspension episode.
    ///
    /// Fails with `DuplicateActivePurgatory` if one is already active.
    async fn open_purgatory(
        &mut self,
        event: &NewPurgatoryEvent,
    ) -> Result<PurgatoryEvent, DomainError>;

    async fn resolve_purgatory(
        &mut self,
        id: PurgatoryEventId,
        resolved_at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Moves every active relationship involving the organization to purgatory.
    ///
    /// Returns the number of relationships changed.
    async fn suspend_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError>;

    /// Reactivates relationships whose counterpart is active.
    ///
    /// The caller must already have marked `organization_id` active in this
    /// transaction. Relationships whose other side is still in purgatory are
    /// left untouched.
    async fn reactivate_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
