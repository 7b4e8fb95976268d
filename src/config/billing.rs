//! Billing catalog configuration
//!
//! Catalog entries are lists rather than maps so that provider ids keep
//! their case through the config loader.

use serde::Deserialize;
use std::collections::HashSet;

use super::error::ValidationError;
use crate::domain::billing::{BillingCatalog, PurgatoryPolicy, RenewalPolicy, SubscriptionTier};
use crate::domain::foundation::Credits;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BundleEntry {
    pub id: String,
    pub credits: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PriceEntry {
    pub price_id: String,
    pub tier: SubscriptionTier,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TierAllotment {
    pub tier: SubscriptionTier,
    pub monthly_credits: u64,
}

/// Bundle, price and tier mappings plus lifecycle thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Credits granted for a bundle id the catalog does not know
    #[serde(default = "default_bundle_credits")]
    pub default_bundle_credits: u64,

    #[serde(default)]
    pub bundles: Vec<BundleEntry>,

    #[serde(default)]
    pub prices: Vec<PriceEntry>,

    #[serde(default)]
    pub tier_allotments: Vec<TierAllotment>,

    #[serde(default)]
    pub renewal_policy: RenewalPolicy,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_failure_window_days")]
    pub failure_window_days: u32,

    #[serde(default = "default_max_payment_attempts")]
    pub max_payment_attempts: u32,
}

impl BillingConfig {
    pub fn purgatory_policy(&self) -> PurgatoryPolicy {
        PurgatoryPolicy {
            failure_threshold: self.failure_threshold,
            failure_window_days: self.failure_window_days,
            max_payment_attempts: self.max_payment_attempts,
        }
    }

    /// Builds the catalog the handlers share.
    pub fn catalog(&self) -> BillingCatalog {
        let mut catalog = BillingCatalog::new(Credits::new(self.default_bundle_credits))
            .with_renewal_policy(self.renewal_policy)
            .with_purgatory_policy(self.purgatory_policy());
        for bundle in &self.bundles {
            catalog = catalog.with_bundle(bundle.id.clone(), Credits::new(bundle.credits));
        }
        for price in &self.prices {
            catalog = catalog.with_price(price.price_id.clone(), price.tier);
        }
        for allotment in &self.tier_allotments {
            catalog = catalog.with_allotment(allotment.tier, Credits::new(allotment.monthly_credits));
        }
        catalog
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        if self.failure_window_days == 0 {
            return Err(ValidationError::InvalidFailureWindow);
        }

        let mut bundles = HashSet::new();
        for bundle in &self.bundles {
            if !bundles.insert(bundle.id.as_str()) {
                return Err(ValidationError::DuplicateCatalogEntry(bundle.id.clone()));
            }
        }
        let mut prices = HashSet::new();
        for price in &self.prices {
            if !prices.insert(price.price_id.as_str()) {
                return Err(ValidationError::DuplicateCatalogEntry(price.price_id.clone()));
            }
        }
        let mut tiers = HashSet::new();
        for allotment in &self.tier_allotments {
            if !tiers.insert(allotment.tier) {
                return Err(ValidationError::DuplicateCatalogEntry(allotment.tier.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_bundle_credits: default_bundle_credits(),
            bundles: Vec::new(),
            prices: Vec::new(),
            tier_allotments: Vec::new(),
            renewal_policy: RenewalPolicy::default(),
            failure_threshold: default_failure_threshold(),
            failure_window_days: default_failure_window_days(),
            max_payment_attempts: default_max_payment_attempts(),
        }
    }
}

fn default_bundle_credits() -> u64 {
    100
}

fn default_failure_threshold() -> u32 {
    PurgatoryPolicy::default().failure_threshold
}

fn default_failure_window_days() -> u32 {
    PurgatoryPolicy::default().failure_window_days
}

fn default_max_payment_attempts() -> u32 {
    PurgatoryPolicy::default().max_payment_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_TOML: &str = r#"
        default_bundle_credits = 50
        renewal_policy = "accumulate"

        [[bundles]]
        id = "bundle_500"
        credits = 500

        [[prices]]
        price_id = "price_1PqRsTUvWxYz"
        tier = "tier_2"

        [[tier_allotments]]
        tier = "tier_2"
        monthly_credits = 1500
    "#;

    fn parse(toml: &str) -> BillingConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn catalog_from_toml_keeps_price_id_case() {
        let config = parse(CATALOG_TOML);
        let catalog = config.catalog();

        assert_eq!(
            catalog.tier_for_price("price_1PqRsTUvWxYz"),
            Some(SubscriptionTier::Tier2)
        );
        assert_eq!(catalog.allotment_for(SubscriptionTier::Tier2), Some(Credits::new(1_500)));
        assert_eq!(catalog.credits_for_bundle(Some("bundle_500")).credits(), Credits::new(500));
        assert_eq!(catalog.credits_for_bundle(Some("nope")).credits(), Credits::new(50));
        assert_eq!(catalog.renewal_policy(), RenewalPolicy::Accumulate);
    }

    #[test]
    fn defaults_follow_purgatory_policy() {
        let config = parse("");
        assert_eq!(config.purgatory_policy(), PurgatoryPolicy::default());
        assert_eq!(config.renewal_policy, RenewalPolicy::Reset);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_price_is_rejected() {
        let config = BillingConfig {
            prices: vec![
                PriceEntry {
                    price_id: "price_a".to_string(),
                    tier: SubscriptionTier::Tier1,
                },
                PriceEntry {
                    price_id: "price_a".to_string(),
                    tier: SubscriptionTier::Tier2,
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateCatalogEntry(id)) if id == "price_a"
        ));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = BillingConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidFailureThreshold)));
    }
}
