//! Cross-organization relationships.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::{OrganizationId, RelationshipId, ValidationError};

use super::organization::OrganizationStatus;

/// Coarse projection of the participants' status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Active,
    Purgatory,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Purgatory => "purgatory",
        }
    }

    /// Status a relationship should have given both participants.
    pub fn for_participants(a: OrganizationStatus, b: OrganizationStatus) -> Self {
        if a == OrganizationStatus::Active && b == OrganizationStatus::Active {
            RelationshipStatus::Active
        } else {
            RelationshipStatus::Purgatory
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RelationshipStatus::Active),
            "purgatory" => Ok(RelationshipStatus::Purgatory),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown relationship status '{}'", other),
            )),
        }
    }
}

/// Link between two organizations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationRelationship {
    pub id: RelationshipId,
    pub organization_id: OrganizationId,
    pub related_organization_id: OrganizationId,
    pub status: RelationshipStatus,
}

impl OrganizationRelationship {
    pub fn involves(&self, org: OrganizationId) -> bool {
        self.organization_id == org || self.related_organization_id == org
    }

    /// The other participant, if `org` is one of the two.
    pub fn counterpart(&self, org: OrganizationId) -> Option<OrganizationId> {
        if self.organization_id == org {
            Some(self.related_organization_id)
        } else if self.related_organization_id == org {
            Some(self.organization_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> OrganizationRelationship {
        OrganizationRelationship {
            id: RelationshipId::new(1),
            organization_id: OrganizationId::new(10),
            related_organization_id: OrganizationId::new(20),
            status: RelationshipStatus::Active,
        }
    }

    #[test]
    fn counterpart_works_from_either_side() {
        let rel = link();
        assert_eq!(rel.counterpart(OrganizationId::new(10)), Some(OrganizationId::new(20)));
        assert_eq!(rel.counterpart(OrganizationId::new(20)), Some(OrganizationId::new(10)));
        assert_eq!(rel.counterpart(OrganizationId::new(30)), None);
    }

    #[test]
    fn active_only_when_both_participants_active() {
        use OrganizationStatus::*;
        assert_eq!(RelationshipStatus::for_participants(Active, Active), RelationshipStatus::Active);
        assert_eq!(
            RelationshipStatus::for_participants(Active, Purgatory),
            RelationshipStatus::Purgatory
        );
        assert_eq!(
            RelationshipStatus::for_participants(Purgatory, Active),
            RelationshipStatus::Purgatory
        );
    }
}
