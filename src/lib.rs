//! Billing Ledger - payment webhook ledger and organization lifecycle.
//!
//! Consumes Stripe webhook deliveries and applies each one exactly once:
//! credit top-ups, subscription renewals, payment failures and
//! cancellations, with an append-only ledger and the active/purgatory
//! state machine for organizations and their relationships.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
