//! In-memory adapters for tests and database-free local runs.

mod admin_directory;
mod billing_store;
mod notifier;

pub use admin_directory::InMemoryAdminDirectory;
pub use billing_store::InMemoryBillingStore;
pub use notifier::{RecordingNotifier, SentNotification};
