//! PostgreSQL adapters - Database implementations for the billing ports.
//!
//! - `PostgresBillingStore` - Transactions over organizations, the ledger,
//!   purgatory episodes and relationships; also the dead-letter sink
//! - `PostgresAdminDirectory` - Administrator addresses for notifications

mod admin_directory;
mod billing_store;

pub use admin_directory::PostgresAdminDirectory;
pub use billing_store::PostgresBillingStore;
