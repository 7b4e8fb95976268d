//! Product catalog and lifecycle policy.
//!
//! Maps provider identifiers (credit bundles, subscription prices) onto
//! credit amounts and tiers, and carries the tunables that decide when an
//! organization is suspended.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::foundation::{Credits, Timestamp, ValidationError};

use super::organization::SubscriptionTier;

/// How a paid subscription invoice affects the credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalPolicy {
    /// Balance becomes exactly the tier allotment.
    #[default]
    Reset,
    /// Allotment is added on top of the remaining balance.
    Accumulate,
}

impl RenewalPolicy {
    /// Computes the balance after renewal.
    pub fn apply(&self, balance: Credits, allotment: Credits) -> Result<Credits, ValidationError> {
        match self {
            RenewalPolicy::Reset => Ok(allotment),
            RenewalPolicy::Accumulate => balance.checked_add(allotment),
        }
    }
}

/// Thresholds for payment-failure suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PurgatoryPolicy {
    /// Failures inside the window that trigger suspension.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_failure_window_days")]
    pub failure_window_days: u32,

    /// Provider retry count above which the organization is suspended
    /// regardless of the windowed count.
    #[serde(default = "default_max_payment_attempts")]
    pub max_payment_attempts: u32,
}

impl PurgatoryPolicy {
    /// Start of the trailing failure window ending at `now`.
    pub fn window_start(&self, now: Timestamp) -> Timestamp {
        now.minus_days(i64::from(self.failure_window_days))
    }

    /// Whether a failed payment should move the organization to purgatory.
    ///
    /// `failures_in_window` includes the failure being processed.
    pub fn should_suspend(&self, failures_in_window: u64, attempt_count: u32) -> bool {
        failures_in_window >= u64::from(self.failure_threshold)
            || attempt_count > self.max_payment_attempts
    }
}

impl Default for PurgatoryPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_days: default_failure_window_days(),
            max_payment_attempts: default_max_payment_attempts(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_failure_window_days() -> u32 {
    30
}

fn default_max_payment_attempts() -> u32 {
    2
}

/// Result of mapping a purchased bundle to credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleCredits {
    /// Bundle id found in the catalog.
    Known(Credits),
    /// Bundle id missing or unknown; the configured default applies.
    Fallback(Credits),
}

impl BundleCredits {
    pub fn credits(&self) -> Credits {
        match self {
            BundleCredits::Known(c) | BundleCredits::Fallback(c) => *c,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, BundleCredits::Fallback(_))
    }
}

/// Lookup tables built from configuration.
#[derive(Debug, Clone, Default)]
pub struct BillingCatalog {
    bundles: HashMap<String, Credits>,
    default_bundle_credits: Credits,
    prices: HashMap<String, SubscriptionTier>,
    allotments: HashMap<SubscriptionTier, Credits>,
    renewal_policy: RenewalPolicy,
    purgatory_policy: PurgatoryPolicy,
}

impl BillingCatalog {
    pub fn new(default_bundle_credits: Credits) -> Self {
        Self {
            default_bundle_credits,
            ..Self::default()
        }
    }

    pub fn with_bundle(mut self, bundle_id: impl Into<String>, credits: Credits) -> Self {
        self.bundles.insert(bundle_id.into(), credits);
        self
    }

    pub fn with_price(mut self, price_id: impl Into<String>, tier: SubscriptionTier) -> Self {
        self.prices.insert(price_id.into(), tier);
        self
    }

    pub fn with_allotment(mut self, tier: SubscriptionTier, credits: Credits) -> Self {
        self.allotments.insert(tier, credits);
        self
    }

    pub fn with_renewal_policy(mut self, policy: RenewalPolicy) -> Self {
        self.renewal_policy = policy;
        self
    }

    pub fn with_purgatory_policy(mut self, policy: PurgatoryPolicy) -> Self {
        self.purgatory_policy = policy;
        self
    }

    pub fn credits_for_bundle(&self, bundle_id: Option<&str>) -> BundleCredits {
        match bundle_id.and_then(|id| self.bundles.get(id)) {
            Some(credits) => BundleCredits::Known(*credits),
            None => BundleCredits::Fallback(self.default_bundle_credits),
        }
    }

    pub fn tier_for_price(&self, price_id: &str) -> Option<SubscriptionTier> {
        self.prices.get(price_id).copied()
    }

    pub fn allotment_for(&self, tier: SubscriptionTier) -> Option<Credits> {
        self.allotments.get(&tier).copied()
    }

    pub fn renewal_policy(&self) -> RenewalPolicy {
        self.renewal_policy
    }

    pub fn purgatory_policy(&self) -> &PurgatoryPolicy {
        &self.purgatory_policy
    }
}
