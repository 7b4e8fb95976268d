//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types that form the
//! vocabulary of the billing domain.

mod credits;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use credits::Credits;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{BillingEventId, OrganizationId, PurgatoryEventId, RelationshipId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
