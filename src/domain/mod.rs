//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `billing` - Ledger, organization lifecycle and webhook processing

pub mod billing;
pub mod foundation;
