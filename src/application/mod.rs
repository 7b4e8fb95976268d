//! Application layer - webhook handlers and their routing.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::BillingHandlerRegistry;
