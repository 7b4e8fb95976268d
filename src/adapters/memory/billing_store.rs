//! In-memory billing store.
//!
//! A transaction takes the store-wide lock, works on a private copy of the
//! state, and swaps it in on commit. Events are therefore serialized across
//! all organizations, which is coarser than the row locks in PostgreSQL but
//! gives the same atomicity. Used by tests and local runs without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::domain::billing::{
    BillingEvent, BillingEventType, NewBillingEvent, NewPurgatoryEvent, Organization,
    OrganizationRelationship, OrganizationStatus, PurgatoryEvent, RelationshipStatus,
};
use crate::domain::foundation::{
    BillingEventId, DomainError, ErrorCode, OrganizationId, PurgatoryEventId, RelationshipId,
    Timestamp,
};
use crate::ports::{
    BillingStore, BillingTransaction, DeadLetterEntry, DeadLetterRecord, DeadLetterSink,
    InsertOutcome, OrganizationLookup,
};

#[derive(Debug, Clone, Default)]
struct BillingState {
    organizations: HashMap<OrganizationId, Organization>,
    billing_events: Vec<BillingEvent>,
    purgatory_events: Vec<PurgatoryEvent>,
    relationships: Vec<OrganizationRelationship>,
    dead_letters: HashMap<String, DeadLetterRecord>,
    next_id: i64,
}

impl BillingState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct InMemoryBillingStore {
    state: Arc<Mutex<BillingState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BillingState::default())),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Applies a seed to the owned state.
    ///
    /// Seeding needs sole ownership of the state; a transaction that is
    /// still alive keeps it shared and the seed is refused with a warning.
    fn seed(mut self, apply: impl FnOnce(&mut BillingState)) -> Self {
        match Arc::get_mut(&mut self.state) {
            Some(state) => apply(state.get_mut()),
            None => warn!("In-memory store is shared by an open transaction, seed not applied"),
        }
        self
    }

    /// Seeds an organization.
    pub fn with_organization(self, organization: Organization) -> Self {
        self.seed(|state| {
            state.organizations.insert(organization.id, organization);
        })
    }

    /// Seeds a relationship whose status follows both participants.
    pub fn with_relationship(self, a: OrganizationId, b: OrganizationId) -> Self {
        self.seed(|state| {
            let status_of = |id: OrganizationId| {
                state
                    .organizations
                    .get(&id)
                    .map(|o| o.status)
                    .unwrap_or(OrganizationStatus::Active)
            };
            let status = RelationshipStatus::for_participants(status_of(a), status_of(b));
            let id = RelationshipId::new(state.next_id());
            state.relationships.push(OrganizationRelationship {
                id,
                organization_id: a,
                related_organization_id: b,
                status,
            });
        })
    }

    /// Seeds a ledger row with an explicit creation time.
    pub fn with_billing_event(self, event: NewBillingEvent, created_at: Timestamp) -> Self {
        self.seed(|state| {
            let id = BillingEventId::new(state.next_id());
            state.billing_events.push(event.into_record(id, created_at));
        })
    }

    /// Seeds an active suspension episode.
    pub fn with_active_purgatory(self, event: NewPurgatoryEvent) -> Self {
        self.seed(|state| {
            let id = PurgatoryEventId::new(state.next_id());
            state
                .purgatory_events
                .push(PurgatoryEvent::open(id, event, Timestamp::now()));
        })
    }

    /// Makes the next commit fail, simulating a lost connection.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub async fn organization(&self, id: OrganizationId) -> Option<Organization> {
        self.state.lock().await.organizations.get(&id).cloned()
    }

    pub async fn billing_events(&self) -> Vec<BillingEvent> {
        self.state.lock().await.billing_events.clone()
    }

    pub async fn purgatory_events(&self) -> Vec<PurgatoryEvent> {
        self.state.lock().await.purgatory_events.clone()
    }

    pub async fn relationships(&self) -> Vec<OrganizationRelationship> {
        self.state.lock().await.relationships.clone()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.state.lock().await.dead_letters.values().cloned().collect()
    }
}

impl Default for InMemoryBillingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryBillingTransaction {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        }))
    }

    async fn is_event_applied(&self, provider_event_id: &str) -> Result<bool, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .billing_events
            .iter()
            .any(|e| e.provider_event_id == provider_event_id))
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryBillingStore {
    async fn record(&self, entry: DeadLetterEntry) -> Result<u32, DomainError> {
        let mut state = self.state.lock().await;
        let now = Timestamp::now();
        let record = state
            .dead_letters
            .entry(entry.provider_event_id.clone())
            .and_modify(|existing| {
                existing.attempts += 1;
                existing.last_seen_at = now;
                existing.entry.reason = entry.reason.clone();
            })
            .or_insert_with(|| DeadLetterRecord {
                entry,
                attempts: 1,
                first_seen_at: now,
                last_seen_at: now,
            });
        Ok(record.attempts)
    }
}

struct InMemoryBillingTransaction {
    guard: OwnedMutexGuard<BillingState>,
    working: BillingState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl BillingTransaction for InMemoryBillingTransaction {
    async fn lock_organization(
        &mut self,
        lookup: &OrganizationLookup,
    ) -> Result<Option<Organization>, DomainError> {
        let found = match lookup {
            OrganizationLookup::ById(id) => self.working.organizations.get(id),
            OrganizationLookup::ByCustomer(customer) => self
                .working
                .organizations
                .values()
                .find(|o| o.billing_customer_id.as_deref() == Some(customer.as_str())),
        };
        Ok(found.cloned())
    }

    async fn update_organization(&mut self, organization: &Organization) -> Result<(), DomainError> {
        match self.working.organizations.get_mut(&organization.id) {
            Some(existing) => {
                *existing = organization.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::OrganizationNotFound,
                format!("organization {}", organization.id),
            )),
        }
    }

    async fn insert_billing_event(
        &mut self,
        event: &NewBillingEvent,
    ) -> Result<InsertOutcome, DomainError> {
        let exists = self
            .working
            .billing_events
            .iter()
            .any(|e| e.provider_event_id == event.provider_event_id);
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }

        let id = BillingEventId::new(self.working.next_id());
        let record = event.clone().into_record(id, Timestamp::now());
        self.working.billing_events.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn count_billing_events_since(
        &mut self,
        organization_id: OrganizationId,
        event_type: BillingEventType,
        since: Timestamp,
    ) -> Result<u64, DomainError> {
        let count = self
            .working
            .billing_events
            .iter()
            .filter(|e| {
                e.organization_id == organization_id
                    && e.event_type == event_type
                    && !e.created_at.is_before(&since)
            })
            .count();
        Ok(count as u64)
    }

    async fn find_active_purgatory(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<Option<PurgatoryEvent>, DomainError> {
        Ok(self
            .working
            .purgatory_events
            .iter()
            .find(|p| p.organization_id == organization_id && p.is_active())
            .cloned())
    }

    async fn open_purgatory(
        &mut self,
        event: &NewPurgatoryEvent,
    ) -> Result<PurgatoryEvent, DomainError> {
        let already_active = self
            .working
            .purgatory_events
            .iter()
            .any(|p| p.organization_id == event.organization_id && p.is_active());
        if already_active {
            return Err(DomainError::new(
                ErrorCode::DuplicateActivePurgatory,
                format!("organization {} already has an active episode", event.organization_id),
            ));
        }

        let id = PurgatoryEventId::new(self.working.next_id());
        let opened = PurgatoryEvent::open(id, event.clone(), Timestamp::now());
        self.working.purgatory_events.push(opened.clone());
        Ok(opened)
    }

    async fn resolve_purgatory(
        &mut self,
        id: PurgatoryEventId,
        resolved_at: Timestamp,
    ) -> Result<(), DomainError> {
        let episode = self
            .working
            .purgatory_events
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::PurgatoryEventNotFound, format!("purgatory event {}", id))
            })?;
        episode.resolve(resolved_at).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
        })
    }

    async fn suspend_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError> {
        let mut changed = 0;
        for rel in self
            .working
            .relationships
            .iter_mut()
            .filter(|r| r.involves(organization_id) && r.status == RelationshipStatus::Active)
        {
            rel.status = RelationshipStatus::Purgatory;
            changed += 1;
        }
        Ok(changed)
    }

    async fn reactivate_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError> {
        let organizations = &self.working.organizations;
        let mut changed = 0;
        for rel in self.working.relationships.iter_mut() {
            if rel.status != RelationshipStatus::Purgatory {
                continue;
            }
            let Some(counterpart) = rel.counterpart(organization_id) else {
                continue;
            };
            let counterpart_active = organizations
                .get(&counterpart)
                .map(|o| o.status == OrganizationStatus::Active)
                .unwrap_or(false);
            if counterpart_active {
                rel.status = RelationshipStatus::Active;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::database("simulated commit failure"));
        }
        let InMemoryBillingTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
