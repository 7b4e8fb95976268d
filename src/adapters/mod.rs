//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - Billing store and admin directory over PostgreSQL
//! - `memory` - In-memory doubles for tests and local runs
//! - `email` - Notifier implementations
//! - `http` - Axum webhook endpoint

pub mod email;
pub mod http;
pub mod memory;
pub mod postgres;

pub use email::{LoggingNotifier, ResendNotifier};
pub use memory::{InMemoryAdminDirectory, InMemoryBillingStore, RecordingNotifier};
pub use postgres::{PostgresAdminDirectory, PostgresBillingStore};
