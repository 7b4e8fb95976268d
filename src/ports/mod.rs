//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `BillingStore` / `BillingTransaction` - Organizations, the ledger,
//!   purgatory episodes and relationships, scoped to one transaction
//! - `DeadLetterSink` - Events that could not be applied
//!
//! ## Delivery Ports
//!
//! - `PaymentEventVerifier` - Webhook authentication and parsing
//! - `AdminDirectory` - Who to notify for an organization
//! - `Notifier` - Email delivery

mod admin_directory;
mod billing_store;
mod dead_letter;
mod notifier;
mod payment_event_verifier;

pub use admin_directory::AdminDirectory;
pub use billing_store::{BillingStore, BillingTransaction, InsertOutcome, OrganizationLookup};
pub use dead_letter::{DeadLetterEntry, DeadLetterRecord, DeadLetterSink};
pub use notifier::{Notifier, NotifierError};
pub use payment_event_verifier::PaymentEventVerifier;
