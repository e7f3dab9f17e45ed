//! Persistence collaborators consumed by the authentication core
//!
//! Each collaborator is a trait so the core can run against PostgreSQL and
//! Redis in production and against the in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{
    NewPartnerMember, OAuthSettingsUpdate, Organization, PartnerMember, PartnerSession,
    RefreshRecord,
};

pub mod memory;
pub mod officer;
pub mod organization;
pub mod partner;
pub mod token;

pub use memory::{
    MemoryOrganizationRepository, MemoryPartnerRepository, MemoryTokenStore,
    StaticGuildDirectory,
};
pub use officer::PgGuildDirectory;
pub use organization::PgOrganizationRepository;
pub use partner::PgPartnerRepository;
pub use token::RedisTokenStore;

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<Organization>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, StoreError>;

    async fn list(&self) -> Result<Vec<Organization>, StoreError>;

    /// Apply an OAuth settings change; `None` if the organization does not exist
    async fn update_oauth_settings(
        &self,
        id: i64,
        update: &OAuthSettingsUpdate,
    ) -> Result<Option<Organization>, StoreError>;
}

#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn find_member(
        &self,
        external_id: &str,
        organization_id: i64,
    ) -> Result<Option<PartnerMember>, StoreError>;

    /// Insert a member. A concurrent insert for the same (external id,
    /// organization) resolves to the existing row.
    async fn create_member(&self, new_member: &NewPartnerMember)
    -> Result<PartnerMember, StoreError>;

    /// Refresh the username and bump `updated_at`
    async fn touch_member(&self, member_id: i64, username: &str)
    -> Result<PartnerMember, StoreError>;

    /// Delete the member's sessions that expired before `now`
    async fn purge_expired_sessions(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn create_session(&self, session: &PartnerSession) -> Result<(), StoreError>;

    async fn find_session(&self, session_token: &str)
    -> Result<Option<PartnerSession>, StoreError>;
}

/// Officer membership of the guilds this deployment governs
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// Whether the directory can answer membership questions right now
    fn is_ready(&self) -> bool;

    /// Guild ids in which the user is an officer
    async fn officer_guilds(
        &self,
        external_id: &str,
        superadmin_id: &str,
    ) -> Result<Vec<String>, StoreError>;

    async fn display_name(&self, external_id: &str) -> Result<Option<String>, StoreError>;
}

/// Refresh tokens, the access-token revocation list, and consumed state nonces
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put_refresh(
        &self,
        token_hash: &str,
        record: &RefreshRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError>;

    async fn get_refresh(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Returns whether the token existed
    async fn delete_refresh(&self, token_hash: &str) -> Result<bool, StoreError>;

    /// Add a token id to the revocation list; `None` keeps it forever
    async fn revoke_access(&self, jti: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError>;

    async fn is_access_revoked(&self, jti: &str) -> Result<bool, StoreError>;

    /// Mark a state nonce as used. Returns `false` if it was already used.
    async fn claim_state_nonce(&self, nonce: &str, ttl_seconds: u64) -> Result<bool, StoreError>;
}
