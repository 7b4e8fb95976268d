//! DeadLetterSink port - parking events that could not be applied.
//!
//! Events that fail for reasons a retry is unlikely to fix on its own (no
//! matching organization) are recorded here for operator follow-up. The
//! provider keeps retrying regardless; each retry bumps `attempts`.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};

/// An event parked for operator attention.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterEntry {
    pub provider_event_id: String,
    pub event_type: String,
    pub reason: String,
    pub payload: serde_json::Value,
}

/// A stored dead-letter row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    pub entry: DeadLetterEntry,
    pub attempts: u32,
    pub first_seen_at: Timestamp,
    pub last_seen_at: Timestamp,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Upserts the entry by provider event id and returns the attempt count.
    async fn record(&self, entry: DeadLetterEntry) -> Result<u32, DomainError>;
}
