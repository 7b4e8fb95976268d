//! Strongly-typed identifier value objects.
//!
//! Rows in this service are keyed by database-assigned integers, so the
//! identifiers wrap `i64` rather than UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw database identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

integer_id!(
    /// Identifier of an organization.
    OrganizationId
);

integer_id!(
    /// Identifier of a ledger row.
    BillingEventId
);

integer_id!(
    /// Identifier of a suspension episode.
    PurgatoryEventId
);

integer_id!(
    /// Identifier of a cross-organization relationship.
    RelationshipId
);
