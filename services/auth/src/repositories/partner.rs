//! PostgreSQL partner member and partner session repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::{
    error::StoreError,
    models::{NewPartnerMember, PartnerMember, PartnerSession},
    repositories::PartnerRepository,
};

// Projects a `partner_members` row aliased `m` with its points balance.
const MEMBER_PROJECTION: &str = r#"
    m.id, m.external_id, m.organization_id, m.username, m.email, m.auth_provider,
    COALESCE(
        (SELECT SUM(p.points) FROM partner_points p WHERE p.partner_member_id = m.id),
        0
    )::DOUBLE PRECISION AS points_balance,
    m.created_at, m.updated_at
"#;

/// Partner repository
#[derive(Clone)]
pub struct PgPartnerRepository {
    pool: PgPool,
}

impl PgPartnerRepository {
    /// Create a new partner repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartnerRepository for PgPartnerRepository {
    async fn find_member(
        &self,
        external_id: &str,
        organization_id: i64,
    ) -> Result<Option<PartnerMember>, StoreError> {
        let query = format!(
            "SELECT {MEMBER_PROJECTION} FROM partner_members m \
             WHERE m.external_id = $1 AND m.organization_id = $2"
        );
        let member = sqlx::query_as::<_, PartnerMember>(&query)
            .bind(external_id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(member)
    }

    async fn create_member(
        &self,
        new_member: &NewPartnerMember,
    ) -> Result<PartnerMember, StoreError> {
        info!(
            "Creating partner member for external id {} in organization {}",
            new_member.external_id, new_member.organization_id
        );

        let query = format!(
            r#"
            WITH m AS (
                INSERT INTO partner_members (external_id, organization_id, username, email, auth_provider)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (external_id, organization_id)
                DO UPDATE SET username = EXCLUDED.username, updated_at = now()
                RETURNING *
            )
            SELECT {MEMBER_PROJECTION} FROM m
            "#
        );
        let member = sqlx::query_as::<_, PartnerMember>(&query)
            .bind(&new_member.external_id)
            .bind(new_member.organization_id)
            .bind(&new_member.username)
            .bind(&new_member.email)
            .bind(&new_member.auth_provider)
            .fetch_one(&self.pool)
            .await?;
        Ok(member)
    }

    async fn touch_member(
        &self,
        member_id: i64,
        username: &str,
    ) -> Result<PartnerMember, StoreError> {
        let query = format!(
            r#"
            WITH m AS (
                UPDATE partner_members SET username = $2, updated_at = now()
                WHERE id = $1
                RETURNING *
            )
            SELECT {MEMBER_PROJECTION} FROM m
            "#
        );
        let member = sqlx::query_as::<_, PartnerMember>(&query)
            .bind(member_id)
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(member)
    }

    async fn purge_expired_sessions(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM partner_sessions WHERE partner_member_id = $1 AND expires_at < $2",
        )
        .bind(member_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_session(&self, session: &PartnerSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO partner_sessions
                (session_token, partner_member_id, organization_id, points_balance, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.session_token)
        .bind(session.partner_member_id)
        .bind(session.organization_id)
        .bind(session.points_balance)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(
        &self,
        session_token: &str,
    ) -> Result<Option<PartnerSession>, StoreError> {
        let session = sqlx::query_as::<_, PartnerSession>(
            r#"
            SELECT session_token, partner_member_id, organization_id, points_balance, expires_at, created_at
            FROM partner_sessions
            WHERE session_token = $1
            "#,
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }
}
