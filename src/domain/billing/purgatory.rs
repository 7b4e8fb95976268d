//! Suspension episodes.
//!
//! Each time an organization enters purgatory one episode is opened; the
//! episode is resolved when a successful payment brings it back. At most one
//! episode per organization is active at a time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    OrganizationId, PurgatoryEventId, StateMachine, Timestamp, ValidationError,
};

/// Why an organization was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgatoryReason {
    PaymentFailed,
    SubscriptionCanceled,
}

impl PurgatoryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgatoryReason::PaymentFailed => "payment_failed",
            PurgatoryReason::SubscriptionCanceled => "subscription_canceled",
        }
    }
}

impl FromStr for PurgatoryReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_failed" => Ok(PurgatoryReason::PaymentFailed),
            "subscription_canceled" => Ok(PurgatoryReason::SubscriptionCanceled),
            other => Err(ValidationError::invalid_format(
                "reason",
                format!("unknown purgatory reason '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PurgatoryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Episode status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgatoryStatus {
    Active,
    Resolved,
}

impl PurgatoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgatoryStatus::Active => "active",
            PurgatoryStatus::Resolved => "resolved",
        }
    }
}

impl StateMachine for PurgatoryStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (PurgatoryStatus::Active, PurgatoryStatus::Resolved)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            PurgatoryStatus::Active => vec![PurgatoryStatus::Resolved],
            PurgatoryStatus::Resolved => vec![],
        }
    }
}

impl FromStr for PurgatoryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PurgatoryStatus::Active),
            "resolved" => Ok(PurgatoryStatus::Resolved),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown purgatory status '{}'", other),
            )),
        }
    }
}

/// Data for opening a new episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurgatoryEvent {
    pub organization_id: OrganizationId,
    pub reason: PurgatoryReason,
    /// Provider event id that caused the suspension.
    pub triggered_by: String,
}

/// A suspension episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgatoryEvent {
    pub id: PurgatoryEventId,
    pub organization_id: OrganizationId,
    pub reason: PurgatoryReason,
    pub triggered_by: String,
    pub status: PurgatoryStatus,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl PurgatoryEvent {
    /// Opens an active episode.
    pub fn open(id: PurgatoryEventId, new: NewPurgatoryEvent, created_at: Timestamp) -> Self {
        Self {
            id,
            organization_id: new.organization_id,
            reason: new.reason,
            triggered_by: new.triggered_by,
            status: PurgatoryStatus::Active,
            created_at,
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PurgatoryStatus::Active
    }

    /// Closes the episode. Resolving twice is an invalid transition.
    pub fn resolve(&mut self, at: Timestamp) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(PurgatoryStatus::Resolved)?;
        self.resolved_at = Some(at);
        Ok(())
    }
}
