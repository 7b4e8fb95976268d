//! Purgatory entry and exit shared by the billing handlers.

use tracing::{info, warn};

use crate::domain::billing::{
    BillingCatalog, NewPurgatoryEvent, Organization, PurgatoryReason, SubscriptionTier,
    WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingTransaction, OrganizationLookup};

/// Locks the organization or fails with `OrganizationNotFound`.
pub(crate) async fn lock_organization(
    tx: &mut dyn BillingTransaction,
    lookup: OrganizationLookup,
) -> Result<Organization, WebhookError> {
    tx.lock_organization(&lookup)
        .await?
        .ok_or_else(|| WebhookError::OrganizationNotFound(lookup.to_string()))
}

/// Moves the organization into purgatory and cascades to relationships.
///
/// Opens a suspension episode unless one is already active. Returns false
/// without writing anything when the organization is already suspended.
/// The caller persists `organization`.
pub(crate) async fn enter_purgatory(
    tx: &mut dyn BillingTransaction,
    organization: &mut Organization,
    reason: PurgatoryReason,
    event_id: &str,
) -> Result<bool, WebhookError> {
    if !organization.suspend()? {
        return Ok(false);
    }

    if tx.find_active_purgatory(organization.id).await?.is_none() {
        tx.open_purgatory(&NewPurgatoryEvent {
            organization_id: organization.id,
            reason,
            triggered_by: event_id.to_string(),
        })
        .await?;
    }

    let relationships = tx.suspend_relationships(organization.id).await?;
    info!(
        event_id = %event_id,
        organization_id = %organization.id,
        reason = %reason,
        relationships,
        "Organization entered purgatory"
    );
    Ok(true)
}

/// Returns the organization to active, resolving its episode and
/// reactivating relationships whose other side is active.
///
/// Returns false when the organization was not suspended.
/// The caller persists `organization`.
pub(crate) async fn exit_purgatory(
    tx: &mut dyn BillingTransaction,
    organization: &mut Organization,
    event_id: &str,
) -> Result<bool, WebhookError> {
    if !organization.reactivate()? {
        return Ok(false);
    }

    match tx.find_active_purgatory(organization.id).await? {
        Some(episode) => tx.resolve_purgatory(episode.id, Timestamp::now()).await?,
        None => warn!(
            event_id = %event_id,
            organization_id = %organization.id,
            "Organization was in purgatory without an active episode"
        ),
    }

    let relationships = tx.reactivate_relationships(organization.id).await?;
    info!(
        event_id = %event_id,
        organization_id = %organization.id,
        relationships,
        "Organization left purgatory"
    );
    Ok(true)
}

/// Maps a provider price to a tier, warning when the price is unknown.
pub(crate) fn tier_for_price(
    catalog: &BillingCatalog,
    price_id: Option<&str>,
    event_id: &str,
) -> Option<SubscriptionTier> {
    let tier = price_id.and_then(|price| catalog.tier_for_price(price));
    if tier.is_none() {
        warn!(
            event_id = %event_id,
            price_id = ?price_id,
            "Price does not map to a subscription tier"
        );
    }
    tier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{OrganizationKind, OrganizationStatus, PurgatoryStatus};
    use crate::domain::foundation::OrganizationId;
    use crate::ports::BillingStore;

    fn org(id: i64) -> Organization {
        Organization::new(OrganizationId::new(id), format!("Org {}", id), OrganizationKind::Metered)
    }

    #[tokio::test]
    async fn entering_twice_opens_one_episode() {
        let store = InMemoryBillingStore::new().with_organization(org(1));
        let mut tx = store.begin().await.unwrap();
        let mut organization = org(1);

        let first =
            enter_purgatory(tx.as_mut(), &mut organization, PurgatoryReason::PaymentFailed, "evt_a")
                .await
                .unwrap();
        let second =
            enter_purgatory(tx.as_mut(), &mut organization, PurgatoryReason::PaymentFailed, "evt_b")
                .await
                .unwrap();
        tx.update_organization(&organization).await.unwrap();
        tx.commit().await.unwrap();

        assert!(first);
        assert!(!second);
        let episodes = store.purgatory_events().await;
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].triggered_by, "evt_a");
    }

    #[tokio::test]
    async fn exit_resolves_active_episode() {
        let store = InMemoryBillingStore::new()
            .with_organization(org(1))
            .with_active_purgatory(NewPurgatoryEvent {
                organization_id: OrganizationId::new(1),
                reason: PurgatoryReason::SubscriptionCanceled,
                triggered_by: "evt_cancel".to_string(),
            });
        let mut organization = org(1);
        organization.status = OrganizationStatus::Purgatory;

        let mut tx = store.begin().await.unwrap();
        let exited = exit_purgatory(tx.as_mut(), &mut organization, "evt_paid").await.unwrap();
        tx.commit().await.unwrap();

        assert!(exited);
        let episodes = store.purgatory_events().await;
        assert_eq!(episodes[0].status, PurgatoryStatus::Resolved);
        assert!(episodes[0].resolved_at.is_some());
    }

    #[tokio::test]
    async fn exit_is_noop_for_active_organization() {
        let store = InMemoryBillingStore::new().with_organization(org(1));
        let mut organization = org(1);
        let mut tx = store.begin().await.unwrap();

        assert!(!exit_purgatory(tx.as_mut(), &mut organization, "evt").await.unwrap());
    }

    #[test]
    fn unknown_price_yields_none() {
        let catalog = BillingCatalog::default().with_price("price_a", SubscriptionTier::Tier1);
        assert_eq!(tier_for_price(&catalog, Some("price_a"), "evt"), Some(SubscriptionTier::Tier1));
        assert_eq!(tier_for_price(&catalog, Some("price_b"), "evt"), None);
        assert_eq!(tier_for_price(&catalog, None, "evt"), None);
    }
}
