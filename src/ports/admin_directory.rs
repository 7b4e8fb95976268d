//! AdminDirectory port - who gets billing notifications.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrganizationId};

#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// Email addresses of the organization's administrators.
    async fn list_admin_emails(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<String>, DomainError>;
}
