//! Officer lookup backed by the `officers` table

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{error::StoreError, repositories::GuildDirectory};

#[derive(Clone)]
pub struct PgGuildDirectory {
    pool: PgPool,
}

impl PgGuildDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildDirectory for PgGuildDirectory {
    fn is_ready(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn officer_guilds(
        &self,
        external_id: &str,
        superadmin_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        // The superadmin governs every active organization.
        if !superadmin_id.is_empty() && external_id == superadmin_id {
            let guilds = sqlx::query_scalar::<_, String>(
                "SELECT guild_id FROM organizations WHERE is_active ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            return Ok(guilds);
        }

        let guilds = sqlx::query_scalar::<_, String>(
            r#"
            SELECT o.guild_id
            FROM officers f
            JOIN organizations o ON o.id = f.organization_id
            WHERE f.user_id = $1 AND o.is_active
            ORDER BY o.id
            "#,
        )
        .bind(external_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(guilds)
    }

    async fn display_name(&self, external_id: &str) -> Result<Option<String>, StoreError> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT display_name FROM officers \
             WHERE user_id = $1 AND display_name IS NOT NULL \
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }
}
