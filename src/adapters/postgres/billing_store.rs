//! PostgreSQL implementation of BillingStore and DeadLetterSink.
//!
//! Each provider event runs inside one `sqlx::Transaction`. The organization
//! row is taken with `FOR UPDATE`, ledger inserts rely on the unique
//! `provider_event_id` column, and the one-active-episode rule is enforced
//! by a partial unique index on `purgatory_events`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::billing::{
    BillingEventType, NewBillingEvent, NewPurgatoryEvent, Organization, OrganizationKind,
    OrganizationStatus, PurgatoryEvent, PurgatoryReason, PurgatoryStatus, SubscriptionTier,
};
use crate::domain::foundation::{
    BillingEventId, Credits, DomainError, ErrorCode, OrganizationId, PurgatoryEventId, Timestamp,
};
use crate::ports::{
    BillingStore, BillingTransaction, DeadLetterEntry, DeadLetterSink, InsertOutcome,
    OrganizationLookup,
};

const ACTIVE_EPISODE_INDEX: &str = "purgatory_events_one_active_per_org";

/// PostgreSQL implementation of the BillingStore port.
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database(format!("Failed to begin transaction: {}", e)))?;
        Ok(Box::new(PostgresBillingTransaction { tx }))
    }

    async fn is_event_applied(&self, provider_event_id: &str) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM billing_events WHERE provider_event_id = $1)",
        )
        .bind(provider_event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check billing event: {}", e)))
    }
}

#[async_trait]
impl DeadLetterSink for PostgresBillingStore {
    async fn record(&self, entry: DeadLetterEntry) -> Result<u32, DomainError> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO dead_letter_events (
                provider_event_id, event_type, reason, payload, attempts, first_seen_at, last_seen_at
            ) VALUES ($1, $2, $3, $4, 1, NOW(), NOW())
            ON CONFLICT (provider_event_id) DO UPDATE SET
                reason = EXCLUDED.reason,
                payload = EXCLUDED.payload,
                attempts = dead_letter_events.attempts + 1,
                last_seen_at = NOW()
            RETURNING attempts
            "#,
        )
        .bind(&entry.provider_event_id)
        .bind(&entry.event_type)
        .bind(&entry.reason)
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record dead letter: {}", e)))?;

        Ok(u32::try_from(attempts).unwrap_or(0))
    }
}

/// A billing transaction over one pooled connection.
///
/// Dropping it without `commit` lets sqlx roll the transaction back.
struct PostgresBillingTransaction {
    tx: Transaction<'static, Postgres>,
}

/// Database row representation of an organization.
#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: i64,
    name: String,
    kind: String,
    billing_customer_id: Option<String>,
    credit_balance: i64,
    status: String,
    subscription_tier: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrganizationRow> for Organization {
    type Error = DomainError;

    fn try_from(row: OrganizationRow) -> Result<Self, Self::Error> {
        Ok(Organization {
            id: OrganizationId::new(row.id),
            name: row.name,
            kind: row.kind.parse::<OrganizationKind>()?,
            billing_customer_id: row.billing_customer_id,
            credit_balance: Credits::from_db(row.credit_balance)?,
            status: row.status.parse::<OrganizationStatus>()?,
            subscription_tier: row
                .subscription_tier
                .map(|tier| tier.parse::<SubscriptionTier>())
                .transpose()?,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurgatoryRow {
    id: i64,
    organization_id: i64,
    reason: String,
    triggered_by: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurgatoryRow> for PurgatoryEvent {
    type Error = DomainError;

    fn try_from(row: PurgatoryRow) -> Result<Self, Self::Error> {
        Ok(PurgatoryEvent {
            id: PurgatoryEventId::new(row.id),
            organization_id: OrganizationId::new(row.organization_id),
            reason: row.reason.parse::<PurgatoryReason>()?,
            triggered_by: row.triggered_by,
            status: row.status.parse::<PurgatoryStatus>()?,
            created_at: Timestamp::from_datetime(row.created_at),
            resolved_at: row.resolved_at.map(Timestamp::from_datetime),
        })
    }
}

const ORGANIZATION_COLUMNS: &str = "id, name, kind, billing_customer_id, credit_balance, status, \
     subscription_tier, updated_at";

#[async_trait]
impl BillingTransaction for PostgresBillingTransaction {
    async fn lock_organization(
        &mut self,
        lookup: &OrganizationLookup,
    ) -> Result<Option<Organization>, DomainError> {
        let row = match lookup {
            OrganizationLookup::ById(id) => {
                sqlx::query_as::<_, OrganizationRow>(&format!(
                    "SELECT {} FROM organizations WHERE id = $1 FOR UPDATE",
                    ORGANIZATION_COLUMNS
                ))
                .bind(id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await
            }
            OrganizationLookup::ByCustomer(customer) => {
                sqlx::query_as::<_, OrganizationRow>(&format!(
                    "SELECT {} FROM organizations WHERE billing_customer_id = $1 FOR UPDATE",
                    ORGANIZATION_COLUMNS
                ))
                .bind(customer)
                .fetch_optional(&mut *self.tx)
                .await
            }
        }
        .map_err(|e| DomainError::database(format!("Failed to lock {}: {}", lookup, e)))?;

        row.map(Organization::try_from).transpose()
    }

    async fn update_organization(&mut self, organization: &Organization) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE organizations SET
                billing_customer_id = $2,
                credit_balance = $3,
                status = $4,
                subscription_tier = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(organization.id.as_i64())
        .bind(&organization.billing_customer_id)
        .bind(organization.credit_balance.to_db()?)
        .bind(organization.status.as_str())
        .bind(organization.subscription_tier.map(|tier| tier.as_str()))
        .bind(organization.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update organization: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OrganizationNotFound,
                format!("Organization {} not found", organization.id),
            ));
        }
        Ok(())
    }

    async fn insert_billing_event(
        &mut self,
        event: &NewBillingEvent,
    ) -> Result<InsertOutcome, DomainError> {
        let inserted: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                organization_id, event_type, amount_cents, currency,
                provider_event_id, provider_invoice_id, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider_event_id) DO NOTHING
            RETURNING id, created_at
            "#,
        )
        .bind(event.organization_id.as_i64())
        .bind(event.event_type.as_str())
        .bind(event.amount_cents)
        .bind(&event.currency)
        .bind(&event.provider_event_id)
        .bind(&event.provider_invoice_id)
        .bind(&event.description)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert billing event: {}", e)))?;

        Ok(match inserted {
            Some((id, created_at)) => InsertOutcome::Inserted(event.clone().into_record(
                BillingEventId::new(id),
                Timestamp::from_datetime(created_at),
            )),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn count_billing_events_since(
        &mut self,
        organization_id: OrganizationId,
        event_type: BillingEventType,
        since: Timestamp,
    ) -> Result<u64, DomainError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM billing_events
            WHERE organization_id = $1 AND event_type = $2 AND created_at >= $3
            "#,
        )
        .bind(organization_id.as_i64())
        .bind(event_type.as_str())
        .bind(since.as_datetime())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to count billing events: {}", e)))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn find_active_purgatory(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<Option<PurgatoryEvent>, DomainError> {
        let row = sqlx::query_as::<_, PurgatoryRow>(
            r#"
            SELECT id, organization_id, reason, triggered_by, status, created_at, resolved_at
            FROM purgatory_events
            WHERE organization_id = $1 AND status = 'active'
            "#,
        )
        .bind(organization_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find purgatory event: {}", e)))?;

        row.map(PurgatoryEvent::try_from).transpose()
    }

    async fn open_purgatory(
        &mut self,
        event: &NewPurgatoryEvent,
    ) -> Result<PurgatoryEvent, DomainError> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO purgatory_events (organization_id, reason, triggered_by, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING id, created_at
            "#,
        )
        .bind(event.organization_id.as_i64())
        .bind(event.reason.as_str())
        .bind(&event.triggered_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(ACTIVE_EPISODE_INDEX) {
                    return DomainError::new(
                        ErrorCode::DuplicateActivePurgatory,
                        format!(
                            "Organization {} already has an active purgatory episode",
                            event.organization_id
                        ),
                    );
                }
            }
            DomainError::database(format!("Failed to open purgatory event: {}", e))
        })?;

        Ok(PurgatoryEvent::open(
            PurgatoryEventId::new(id),
            event.clone(),
            Timestamp::from_datetime(created_at),
        ))
    }

    async fn resolve_purgatory(
        &mut self,
        id: PurgatoryEventId,
        resolved_at: Timestamp,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE purgatory_events SET status = 'resolved', resolved_at = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id.as_i64())
        .bind(resolved_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to resolve purgatory event: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PurgatoryEventNotFound,
                format!("No active purgatory event {}", id),
            ));
        }
        Ok(())
    }

    async fn suspend_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE organization_relationships SET status = 'purgatory', updated_at = NOW()
            WHERE status = 'active'
              AND (organization_id = $1 OR related_organization_id = $1)
            "#,
        )
        .bind(organization_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to suspend relationships: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn reactivate_relationships(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<u64, DomainError> {
        // Counterparts are read FOR SHARE so a concurrent suspension of the
        // other side waits for this transaction.
        let result = sqlx::query(
            r#"
            UPDATE organization_relationships r SET status = 'active', updated_at = NOW()
            WHERE r.status = 'purgatory'
              AND (r.organization_id = $1 OR r.related_organization_id = $1)
              AND EXISTS (
                  SELECT 1 FROM organizations o
                  WHERE o.id = CASE
                          WHEN r.organization_id = $1 THEN r.related_organization_id
                          ELSE r.organization_id
                        END
                    AND o.status = 'active'
                  FOR SHARE
              )
            "#,
        )
        .bind(organization_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to reactivate relationships: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let PostgresBillingTransaction { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| DomainError::database(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        let PostgresBillingTransaction { tx } = *self;
        tx.rollback()
            .await
            .map_err(|e| DomainError::database(format!("Failed to roll back transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    fn organization_row() -> OrganizationRow {
        OrganizationRow {
            id: 7,
            name: "Acme".to_string(),
            kind: "metered".to_string(),
            billing_customer_id: Some("cus_7".to_string()),
            credit_balance: 1_500,
            status: "purgatory".to_string(),
            subscription_tier: Some("tier_2".to_string()),
            updated_at: Utc::now(),
        }
    }

    fn purgatory_row() -> PurgatoryRow {
        PurgatoryRow {
            id: 3,
            organization_id: 7,
            reason: "subscription_canceled".to_string(),
            triggered_by: "evt_cancel".to_string(),
            status: "resolved".to_string(),
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        }
    }

    /// A pool that never reaches a server.
    fn unreachable_store() -> PostgresBillingStore {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://billing@127.0.0.1:1/billing")
            .unwrap();
        PostgresBillingStore::new(pool)
    }

    // ══════════════════════════════════════════════════════════════
    // Row conversion
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn organization_row_converts_to_domain() {
        let org = Organization::try_from(organization_row()).unwrap();

        assert_eq!(org.id, OrganizationId::new(7));
        assert_eq!(org.kind, OrganizationKind::Metered);
        assert_eq!(org.billing_customer_id.as_deref(), Some("cus_7"));
        assert_eq!(org.credit_balance, Credits::new(1_500));
        assert_eq!(org.status, OrganizationStatus::Purgatory);
        assert_eq!(org.subscription_tier, Some(SubscriptionTier::Tier2));
    }

    #[test]
    fn organization_columns_round_trip_through_row() {
        let org = Organization::try_from(organization_row()).unwrap();

        let row = OrganizationRow {
            id: org.id.as_i64(),
            name: org.name.clone(),
            kind: org.kind.as_str().to_string(),
            billing_customer_id: org.billing_customer_id.clone(),
            credit_balance: org.credit_balance.to_db().unwrap(),
            status: org.status.as_str().to_string(),
            subscription_tier: org.subscription_tier.map(|t| t.as_str().to_string()),
            updated_at: *org.updated_at.as_datetime(),
        };

        assert_eq!(Organization::try_from(row).unwrap(), org);
    }

    #[test]
    fn organization_without_tier_converts() {
        let row = OrganizationRow {
            subscription_tier: None,
            billing_customer_id: None,
            ..organization_row()
        };

        let org = Organization::try_from(row).unwrap();

        assert_eq!(org.subscription_tier, None);
        assert_eq!(org.billing_customer_id, None);
    }

    #[test]
    fn unknown_organization_status_is_rejected() {
        let row = OrganizationRow {
            status: "suspended".to_string(),
            ..organization_row()
        };

        let err = Organization::try_from(row).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }

    #[test]
    fn unknown_kind_and_tier_are_rejected() {
        let bad_kind = OrganizationRow {
            kind: "enterprise".to_string(),
            ..organization_row()
        };
        let bad_tier = OrganizationRow {
            subscription_tier: Some("platinum".to_string()),
            ..organization_row()
        };

        assert!(Organization::try_from(bad_kind).is_err());
        assert!(Organization::try_from(bad_tier).is_err());
    }

    #[test]
    fn negative_balance_is_rejected() {
        let row = OrganizationRow {
            credit_balance: -5,
            ..organization_row()
        };

        let err = Organization::try_from(row).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }

    #[test]
    fn balance_beyond_bigint_cannot_be_written() {
        let too_large = Credits::new(i64::MAX as u64 + 1);

        assert!(too_large.to_db().is_err());
        assert_eq!(Credits::new(i64::MAX as u64).to_db().unwrap(), i64::MAX);
    }

    #[test]
    fn purgatory_row_converts_to_domain() {
        let episode = PurgatoryEvent::try_from(purgatory_row()).unwrap();

        assert_eq!(episode.id, PurgatoryEventId::new(3));
        assert_eq!(episode.organization_id, OrganizationId::new(7));
        assert_eq!(episode.reason, PurgatoryReason::SubscriptionCanceled);
        assert_eq!(episode.status, PurgatoryStatus::Resolved);
        assert!(episode.resolved_at.is_some());
    }

    #[test]
    fn unknown_purgatory_reason_or_status_is_rejected() {
        let bad_reason = PurgatoryRow {
            reason: "fraud".to_string(),
            ..purgatory_row()
        };
        let bad_status = PurgatoryRow {
            status: "pending".to_string(),
            ..purgatory_row()
        };

        assert!(PurgatoryEvent::try_from(bad_reason).is_err());
        assert!(PurgatoryEvent::try_from(bad_status).is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Error mapping
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unreachable_database_surfaces_database_errors() {
        let store = unreachable_store();

        let begin = store.begin().await.err().unwrap();
        let applied = store.is_event_applied("evt_1").await.unwrap_err();

        assert_eq!(begin.code, ErrorCode::DatabaseError);
        assert_eq!(applied.code, ErrorCode::DatabaseError);
    }

    #[tokio::test]
    async fn dead_letter_write_failure_is_a_database_error() {
        let store = unreachable_store();
        let entry = DeadLetterEntry {
            provider_event_id: "evt_orphan".to_string(),
            event_type: "invoice.payment_succeeded".to_string(),
            reason: "Organization not found".to_string(),
            payload: serde_json::Value::Null,
        };

        let err = store.record(entry).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
