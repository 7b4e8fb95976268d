//! In-memory admin directory.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::foundation::{DomainError, OrganizationId};
use crate::ports::AdminDirectory;

#[derive(Debug, Default)]
pub struct InMemoryAdminDirectory {
    admins: HashMap<OrganizationId, Vec<String>>,
}

impl InMemoryAdminDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, organization_id: OrganizationId, email: impl Into<String>) -> Self {
        self.admins
            .entry(organization_id)
            .or_default()
            .push(email.into());
        self
    }
}

#[async_trait]
impl AdminDirectory for InMemoryAdminDirectory {
    async fn list_admin_emails(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<String>, DomainError> {
        Ok(self.admins.get(&organization_id).cloned().unwrap_or_default())
    }
}
