//! Credit amount value object.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// A non-negative number of credits.
///
/// Balances and bundle amounts share this type so that arithmetic on
/// them is always checked.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Adds `other`, failing instead of wrapping.
    pub fn checked_add(self, other: Credits) -> Result<Credits, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Credits)
            .ok_or(ValidationError::CreditOverflow {
                balance: self.0,
                amount: other.0,
            })
    }

    /// Converts a stored `BIGINT` column, rejecting negative values.
    pub fn from_db(value: i64) -> Result<Credits, ValidationError> {
        u64::try_from(value).map(Credits).map_err(|_| {
            ValidationError::invalid_format("credit_balance", format!("negative value {}", value))
        })
    }

    /// Converts to a `BIGINT` column value.
    pub fn to_db(self) -> Result<i64, ValidationError> {
        i64::try_from(self.0).map_err(|_| {
            ValidationError::invalid_format("credit_balance", format!("{} exceeds BIGINT", self.0))
        })
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Credits {
    fn from(amount: u64) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_sums_amounts() {
        let total = Credits::new(500).checked_add(Credits::new(1500)).unwrap();
        assert_eq!(total, Credits::new(2000));
    }

    #[test]
    fn checked_add_rejects_overflow() {
        let result = Credits::new(u64::MAX).checked_add(Credits::new(1));
        assert!(matches!(result, Err(ValidationError::CreditOverflow { .. })));
    }

    #[test]
    fn from_db_rejects_negative_balance() {
        assert!(Credits::from_db(-1).is_err());
        assert_eq!(Credits::from_db(0).unwrap(), Credits::ZERO);
    }

    #[test]
    fn to_db_rejects_values_beyond_bigint() {
        assert!(Credits::new(u64::MAX).to_db().is_err());
        assert_eq!(Credits::new(1500).to_db().unwrap(), 1500);
    }
}
