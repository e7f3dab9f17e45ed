//! PostgreSQL organization repository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::{
    error::StoreError,
    models::{OAuthSettings, OAuthSettingsUpdate, Organization},
    repositories::OrganizationRepository,
};

const ORGANIZATION_COLUMNS: &str = r#"
    id, name, prefix, guild_id, is_active, storefront_enabled, oauth_enabled,
    oauth_callback_url, allowed_domains, created_at, updated_at
"#;

/// Organization repository
#[derive(Clone)]
pub struct PgOrganizationRepository {
    pool: PgPool,
}

impl PgOrganizationRepository {
    /// Create a new organization repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for PgOrganizationRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<Organization>, StoreError> {
        let query = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE prefix = $1");
        let org = sqlx::query_as::<_, Organization>(&query)
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;
        Ok(org)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, StoreError> {
        let query = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1");
        let org = sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(org)
    }

    async fn list(&self) -> Result<Vec<Organization>, StoreError> {
        let query = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations ORDER BY id");
        let orgs = sqlx::query_as::<_, Organization>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(orgs)
    }

    async fn update_oauth_settings(
        &self,
        id: i64,
        update: &OAuthSettingsUpdate,
    ) -> Result<Option<Organization>, StoreError> {
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1 FOR UPDATE"
        );
        let Some(current) = sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut settings = OAuthSettings::from(&current);
        update.apply(&mut settings);

        let query = format!(
            r#"
            UPDATE organizations
            SET oauth_enabled = $2, oauth_callback_url = $3, allowed_domains = $4, updated_at = now()
            WHERE id = $1
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .bind(settings.oauth_enabled)
            .bind(&settings.oauth_callback_url)
            .bind(&settings.allowed_domains)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Updated OAuth settings for organization {}", updated.prefix);
        Ok(Some(updated))
    }
}
