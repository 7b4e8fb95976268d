//! PostgreSQL implementation of AdminDirectory.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, OrganizationId};
use crate::ports::AdminDirectory;

/// Reads administrator addresses from `organization_members`.
pub struct PostgresAdminDirectory {
    pool: PgPool,
}

impl PostgresAdminDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminDirectory for PostgresAdminDirectory {
    async fn list_admin_emails(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT email FROM organization_members
            WHERE organization_id = $1 AND role = 'admin'
            ORDER BY email
            "#,
        )
        .bind(organization_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list organization admins: {}", e)))
    }
}
