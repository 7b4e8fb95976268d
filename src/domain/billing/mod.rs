//! Billing domain - ledger, organization lifecycle, and provider events.
//!
//! # Module Organization
//!
//! - `organization` - Organization state and the active/purgatory machine
//! - `ledger` - Append-only billing event rows
//! - `purgatory` - Suspension episodes
//! - `relationship` - Cross-organization links affected by suspension
//! - `catalog` - Bundle, price and tier lookups plus lifecycle thresholds
//! - `stripe_objects` / `provider_event` - Wire types and their canonical form
//! - `webhook_verifier` - Signature verification
//! - `idempotency` - Claiming events through the ledger's unique key
//! - `webhook_processor` - Dispatch and transaction orchestration
//! - `notification` - Post-commit notifications

mod catalog;
mod idempotency;
mod ledger;
mod notification;
mod organization;
mod provider_event;
mod purgatory;
mod relationship;
pub mod stripe_objects;
mod webhook_errors;
mod webhook_processor;
mod webhook_verifier;

pub use catalog::{BillingCatalog, BundleCredits, PurgatoryPolicy, RenewalPolicy};
pub use idempotency::{Claim, IdempotencyGuard};
pub use ledger::{BillingEvent, BillingEventType, NewBillingEvent};
pub use notification::{BillingNotification, NotificationDispatcher, NotificationKind};
pub use organization::{Organization, OrganizationKind, OrganizationStatus, SubscriptionTier};
pub use provider_event::{
    CheckoutCompleted, CheckoutMode, InvoicePayment, ProviderEvent, ProviderEventKind,
    ProviderEventType, SubscriptionChange,
};
pub use purgatory::{NewPurgatoryEvent, PurgatoryEvent, PurgatoryReason, PurgatoryStatus};
pub use relationship::{OrganizationRelationship, RelationshipStatus};
pub use webhook_errors::WebhookError;
pub use webhook_processor::{
    BillingEventProcessor, HandlerOutcome, WebhookDispatcher, WebhookEventHandler, WebhookResult,
};
pub use webhook_verifier::{SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub use webhook_verifier::compute_test_signature;
