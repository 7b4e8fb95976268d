//! Organization financial and operational state.
//!
//! The organization row is the shared mutable resource every billing
//! handler serializes on. Handlers load it under a row lock, mutate it
//! through the methods below, and write it back once per event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    Credits, OrganizationId, StateMachine, Timestamp, ValidationError,
};

use super::catalog::RenewalPolicy;

/// Operational status of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    /// Fully operational.
    Active,
    /// Suspended after payment failure or cancellation.
    Purgatory,
}

impl OrganizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Purgatory => "purgatory",
        }
    }
}

impl StateMachine for OrganizationStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use OrganizationStatus::*;
        matches!((self, target), (Active, Purgatory) | (Purgatory, Active))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use OrganizationStatus::*;
        match self {
            Active => vec![Purgatory],
            Purgatory => vec![Active],
        }
    }
}

impl FromStr for OrganizationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OrganizationStatus::Active),
            "purgatory" => Ok(OrganizationStatus::Purgatory),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown organization status '{}'", other),
            )),
        }
    }
}

impl fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the organization consumes credits.
///
/// Only metered organizations receive subscription credit allotments and
/// are suspended when their subscription is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationKind {
    Metered,
    Unmetered,
}

impl OrganizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationKind::Metered => "metered",
            OrganizationKind::Unmetered => "unmetered",
        }
    }
}

impl FromStr for OrganizationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metered" => Ok(OrganizationKind::Metered),
            "unmetered" => Ok(OrganizationKind::Unmetered),
            other => Err(ValidationError::invalid_format(
                "kind",
                format!("unknown organization kind '{}'", other),
            )),
        }
    }
}

/// Subscription level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionTier {
    #[serde(rename = "tier_1")]
    Tier1,
    #[serde(rename = "tier_2")]
    Tier2,
    #[serde(rename = "tier_3")]
    Tier3,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Tier1 => "tier_1",
            SubscriptionTier::Tier2 => "tier_2",
            SubscriptionTier::Tier3 => "tier_3",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tier_1" => Ok(SubscriptionTier::Tier1),
            "tier_2" => Ok(SubscriptionTier::Tier2),
            "tier_3" => Ok(SubscriptionTier::Tier3),
            other => Err(ValidationError::invalid_format(
                "subscription_tier",
                format!("unknown tier '{}'", other),
            )),
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organization as seen by the billing subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub kind: OrganizationKind,
    pub billing_customer_id: Option<String>,
    pub credit_balance: Credits,
    pub status: OrganizationStatus,
    pub subscription_tier: Option<SubscriptionTier>,
    pub updated_at: Timestamp,
}

impl Organization {
    /// Creates an active organization with an empty balance.
    pub fn new(id: OrganizationId, name: impl Into<String>, kind: OrganizationKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            billing_customer_id: None,
            credit_balance: Credits::ZERO,
            status: OrganizationStatus::Active,
            subscription_tier: None,
            updated_at: Timestamp::now(),
        }
    }

    pub fn is_metered(&self) -> bool {
        self.kind == OrganizationKind::Metered
    }

    pub fn is_in_purgatory(&self) -> bool {
        self.status == OrganizationStatus::Purgatory
    }

    /// Records the provider customer reference if none is stored yet.
    ///
    /// Returns true when the reference was attached.
    pub fn attach_customer(&mut self, customer_id: &str) -> bool {
        if self.billing_customer_id.is_some() || customer_id.is_empty() {
            return false;
        }
        self.billing_customer_id = Some(customer_id.to_string());
        self.touch();
        true
    }

    /// Adds purchased credits to the balance, returning the new balance.
    pub fn add_credits(&mut self, amount: Credits) -> Result<Credits, ValidationError> {
        self.credit_balance = self.credit_balance.checked_add(amount)?;
        self.touch();
        Ok(self.credit_balance)
    }

    /// Applies a subscription allotment according to `policy`.
    pub fn replenish(
        &mut self,
        allotment: Credits,
        policy: RenewalPolicy,
    ) -> Result<Credits, ValidationError> {
        self.credit_balance = policy.apply(self.credit_balance, allotment)?;
        self.touch();
        Ok(self.credit_balance)
    }

    /// Replaces the subscription tier. Returns true if it changed.
    pub fn change_tier(&mut self, tier: Option<SubscriptionTier>) -> bool {
        if self.subscription_tier == tier {
            return false;
        }
        self.subscription_tier = tier;
        self.touch();
        true
    }

    /// Moves the organization into purgatory.
    ///
    /// Returns `Ok(false)` when it is already suspended.
    pub fn suspend(&mut self) -> Result<bool, ValidationError> {
        self.transition(OrganizationStatus::Purgatory)
    }

    /// Returns the organization to active.
    ///
    /// Returns `Ok(false)` when it is already active.
    pub fn reactivate(&mut self) -> Result<bool, ValidationError> {
        self.transition(OrganizationStatus::Active)
    }

    fn transition(&mut self, target: OrganizationStatus) -> Result<bool, ValidationError> {
        if self.status == target {
            return Ok(false);
        }
        self.status = self.status.transition_to(target)?;
        self.touch();
        Ok(true)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metered_org() -> Organization {
        Organization::new(OrganizationId::new(1), "Acme Coding", OrganizationKind::Metered)
    }

    #[test]
    fn new_organization_starts_active_with_zero_balance() {
        let org = metered_org();
        assert_eq!(org.status, OrganizationStatus::Active);
        assert_eq!(org.credit_balance, Credits::ZERO);
        assert!(org.subscription_tier.is_none());
    }

    #[test]
    fn add_credits_accumulates() {
        let mut org = metered_org();
        org.add_credits(Credits::new(500)).unwrap();
        let balance = org.add_credits(Credits::new(250)).unwrap();
        assert_eq!(balance, Credits::new(750));
    }

    #[test]
    fn suspend_is_noop_when_already_in_purgatory() {
        let mut org = metered_org();
        assert!(org.suspend().unwrap());
        assert!(!org.suspend().unwrap());
        assert!(org.is_in_purgatory());
    }

    #[test]
    fn reactivate_is_noop_when_active() {
        let mut org = metered_org();
        assert!(!org.reactivate().unwrap());
        org.suspend().unwrap();
        assert!(org.reactivate().unwrap());
        assert_eq!(org.status, OrganizationStatus::Active);
    }

    #[test]
    fn attach_customer_keeps_first_reference() {
        let mut org = metered_org();
        assert!(org.attach_customer("cus_first"));
        assert!(!org.attach_customer("cus_second"));
        assert_eq!(org.billing_customer_id.as_deref(), Some("cus_first"));
    }

    #[test]
    fn change_tier_reports_whether_it_changed() {
        let mut org = metered_org();
        assert!(org.change_tier(Some(SubscriptionTier::Tier2)));
        assert!(!org.change_tier(Some(SubscriptionTier::Tier2)));
        assert!(org.change_tier(None));
    }

    #[test]
    fn status_state_machine_only_allows_flip() {
        use OrganizationStatus::*;
        assert!(Active.can_transition_to(&Purgatory));
        assert!(Purgatory.can_transition_to(&Active));
        assert!(!Active.can_transition_to(&Active));
        assert!(!Active.is_terminal());
    }

    #[test]
    fn tier_parses_database_representation() {
        assert_eq!("tier_2".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Tier2);
        assert!("gold".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn tier_serializes_with_underscore() {
        let json = serde_json::to_string(&SubscriptionTier::Tier3).unwrap();
        assert_eq!(json, "\"tier_3\"");
    }
}
