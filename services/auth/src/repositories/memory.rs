//! In-memory collaborators
//!
//! Used by the test suites and for running the service without PostgreSQL
//! or Redis. Semantics mirror the real stores, including TTLs and the
//! (external id, organization) uniqueness of partner members.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::{
    error::StoreError,
    models::{
        NewPartnerMember, OAuthSettings, OAuthSettingsUpdate, Organization, PartnerMember,
        PartnerSession, RefreshRecord,
    },
    repositories::{GuildDirectory, OrganizationRepository, PartnerRepository, TokenStore},
};

fn deadline(ttl_seconds: u64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64)
}

#[derive(Default)]
struct TokenTables {
    refresh: HashMap<String, (RefreshRecord, DateTime<Utc>)>,
    revoked: HashMap<String, Option<DateTime<Utc>>>,
    nonces: HashMap<String, DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    tables: Arc<Mutex<TokenTables>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put_refresh(
        &self,
        token_hash: &str,
        record: &RefreshRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.refresh.insert(
            token_hash.to_string(),
            (record.clone(), deadline(ttl_seconds)),
        );
        Ok(())
    }

    async fn get_refresh(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        match tables.refresh.get(token_hash) {
            Some((_, expires)) if *expires <= now => {
                tables.refresh.remove(token_hash);
                Ok(None)
            }
            Some((record, _)) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn delete_refresh(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.refresh.remove(token_hash).is_some())
    }

    async fn revoke_access(&self, jti: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables
            .revoked
            .insert(jti.to_string(), ttl_seconds.map(deadline));
        Ok(())
    }

    async fn is_access_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(match tables.revoked.get(jti) {
            Some(Some(expires)) => *expires > Utc::now(),
            Some(None) => true,
            None => false,
        })
    }

    async fn claim_state_nonce(&self, nonce: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        tables.nonces.retain(|_, expires| *expires > now);
        if tables.nonces.contains_key(nonce) {
            return Ok(false);
        }
        tables.nonces.insert(nonce.to_string(), deadline(ttl_seconds));
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub struct MemoryOrganizationRepository {
    orgs: Arc<Mutex<Vec<Organization>>>,
}

impl MemoryOrganizationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an organization
    pub async fn insert(&self, org: Organization) {
        let mut orgs = self.orgs.lock().await;
        orgs.retain(|existing| existing.id != org.id);
        orgs.push(org);
    }
}

#[async_trait]
impl OrganizationRepository for MemoryOrganizationRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<Organization>, StoreError> {
        let orgs = self.orgs.lock().await;
        Ok(orgs.iter().find(|org| org.prefix == prefix).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, StoreError> {
        let orgs = self.orgs.lock().await;
        Ok(orgs.iter().find(|org| org.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Organization>, StoreError> {
        let mut orgs = self.orgs.lock().await.clone();
        orgs.sort_by_key(|org| org.id);
        Ok(orgs)
    }

    async fn update_oauth_settings(
        &self,
        id: i64,
        update: &OAuthSettingsUpdate,
    ) -> Result<Option<Organization>, StoreError> {
        let mut orgs = self.orgs.lock().await;
        let Some(org) = orgs.iter_mut().find(|org| org.id == id) else {
            return Ok(None);
        };

        let mut settings = OAuthSettings::from(&*org);
        update.apply(&mut settings);
        org.oauth_enabled = settings.oauth_enabled;
        org.oauth_callback_url = settings.oauth_callback_url;
        org.allowed_domains = settings.allowed_domains;
        org.updated_at = Utc::now();
        Ok(Some(org.clone()))
    }
}

#[derive(Default)]
struct PartnerTables {
    members: Vec<PartnerMember>,
    points: HashMap<i64, f64>,
    sessions: HashMap<String, PartnerSession>,
}

#[derive(Clone, Default)]
pub struct MemoryPartnerRepository {
    tables: Arc<Mutex<PartnerTables>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryPartnerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit points to a member
    pub async fn award_points(&self, member_id: i64, points: f64) {
        let mut tables = self.tables.lock().await;
        *tables.points.entry(member_id).or_insert(0.0) += points;
    }

    /// Number of stored sessions for a member, expired ones included
    pub async fn session_count(&self, member_id: i64) -> usize {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .values()
            .filter(|session| session.partner_member_id == member_id)
            .count()
    }

    /// Store a session as-is, bypassing the service
    pub async fn insert_session(&self, session: PartnerSession) {
        let mut tables = self.tables.lock().await;
        tables
            .sessions
            .insert(session.session_token.clone(), session);
    }
}

impl PartnerTables {
    fn with_balance(&self, member: &PartnerMember) -> PartnerMember {
        PartnerMember {
            points_balance: self.points.get(&member.id).copied().unwrap_or(0.0),
            ..member.clone()
        }
    }
}

#[async_trait]
impl PartnerRepository for MemoryPartnerRepository {
    async fn find_member(
        &self,
        external_id: &str,
        organization_id: i64,
    ) -> Result<Option<PartnerMember>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .members
            .iter()
            .find(|m| m.external_id == external_id && m.organization_id == organization_id)
            .map(|m| tables.with_balance(m)))
    }

    async fn create_member(
        &self,
        new_member: &NewPartnerMember,
    ) -> Result<PartnerMember, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        if let Some(existing) = tables.members.iter_mut().find(|m| {
            m.external_id == new_member.external_id
                && m.organization_id == new_member.organization_id
        }) {
            existing.username = new_member.username.clone();
            existing.updated_at = now;
            let existing = existing.clone();
            return Ok(tables.with_balance(&existing));
        }

        let member = PartnerMember {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            external_id: new_member.external_id.clone(),
            organization_id: new_member.organization_id,
            username: new_member.username.clone(),
            email: new_member.email.clone(),
            auth_provider: new_member.auth_provider.clone(),
            points_balance: 0.0,
            created_at: now,
            updated_at: now,
        };
        tables.members.push(member.clone());
        Ok(tables.with_balance(&member))
    }

    async fn touch_member(
        &self,
        member_id: i64,
        username: &str,
    ) -> Result<PartnerMember, StoreError> {
        let mut tables = self.tables.lock().await;
        let member = tables
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| StoreError::Backend(format!("partner member {member_id} not found")))?;
        member.username = username.to_string();
        member.updated_at = Utc::now();
        let member = member.clone();
        Ok(tables.with_balance(&member))
    }

    async fn purge_expired_sessions(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| !(s.partner_member_id == member_id && s.expires_at < now));
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn create_session(&self, session: &PartnerSession) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.contains_key(&session.session_token) {
            return Err(StoreError::Conflict("duplicate session token".to_string()));
        }
        tables
            .sessions
            .insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        session_token: &str,
    ) -> Result<Option<PartnerSession>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.get(session_token).cloned())
    }
}

/// Fixed officer membership
#[derive(Clone, Default)]
pub struct StaticGuildDirectory {
    ready: Arc<AtomicBool>,
    governed: Arc<Mutex<Vec<String>>>,
    officers: Arc<Mutex<HashMap<String, Vec<String>>>>,
    names: Arc<Mutex<HashMap<String, String>>>,
}

impl StaticGuildDirectory {
    pub fn new() -> Self {
        let directory = Self::default();
        directory.set_ready(true);
        directory
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Register the guild of an active organization
    pub async fn govern(&self, guild_id: &str) {
        let mut governed = self.governed.lock().await;
        if !governed.iter().any(|g| g == guild_id) {
            governed.push(guild_id.to_string());
        }
    }

    /// Record an officer; the guild becomes governed as well
    pub async fn add_officer(&self, external_id: &str, guild_id: &str) {
        self.govern(guild_id).await;
        let mut officers = self.officers.lock().await;
        officers
            .entry(external_id.to_string())
            .or_default()
            .push(guild_id.to_string());
    }

    pub async fn set_name(&self, external_id: &str, name: &str) {
        let mut names = self.names.lock().await;
        names.insert(external_id.to_string(), name.to_string());
    }
}

#[async_trait]
impl GuildDirectory for StaticGuildDirectory {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn officer_guilds(
        &self,
        external_id: &str,
        superadmin_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        if !superadmin_id.is_empty() && external_id == superadmin_id {
            return Ok(self.governed.lock().await.clone());
        }
        let officers = self.officers.lock().await;
        Ok(officers.get(external_id).cloned().unwrap_or_default())
    }

    async fn display_name(&self, external_id: &str) -> Result<Option<String>, StoreError> {
        let names = self.names.lock().await;
        Ok(names.get(external_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RefreshRecord {
        RefreshRecord {
            username: "ada".to_string(),
            external_id: "1".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn nonce_can_be_claimed_once() {
        let store = MemoryTokenStore::new();
        assert!(store.claim_state_nonce("n1", 600).await.unwrap());
        assert!(!store.claim_state_nonce("n1", 600).await.unwrap());
        assert!(store.claim_state_nonce("n2", 600).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_entries_honour_their_ttl() {
        let store = MemoryTokenStore::new();
        store.put_refresh("live", &record(), 60).await.unwrap();
        store.put_refresh("dead", &record(), 0).await.unwrap();

        assert!(store.get_refresh("live").await.unwrap().is_some());
        assert!(store.get_refresh("dead").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revocation_without_ttl_is_permanent() {
        let store = MemoryTokenStore::new();
        store.revoke_access("forever", None).await.unwrap();
        store.revoke_access("gone", Some(0)).await.unwrap();

        assert!(store.is_access_revoked("forever").await.unwrap());
        assert!(!store.is_access_revoked("gone").await.unwrap());
        assert!(!store.is_access_revoked("never").await.unwrap());
    }

    #[tokio::test]
    async fn superadmin_governs_every_registered_guild() {
        let directory = StaticGuildDirectory::new();
        assert!(directory.officer_guilds("1000", "1000").await.unwrap().is_empty());

        directory.govern("g-acme").await;
        directory.add_officer("77", "g-globex").await;
        assert_eq!(
            directory.officer_guilds("1000", "1000").await.unwrap(),
            vec!["g-acme".to_string(), "g-globex".to_string()]
        );
        assert_eq!(
            directory.officer_guilds("77", "1000").await.unwrap(),
            vec!["g-globex".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_member_creation_resolves_to_existing_row() {
        let repo = MemoryPartnerRepository::new();
        let new_member = NewPartnerMember {
            external_id: "77".to_string(),
            organization_id: 1,
            username: "first".to_string(),
            email: "77@discord.temp".to_string(),
            auth_provider: "discord".to_string(),
        };

        let first = repo.create_member(&new_member).await.unwrap();
        let second = repo
            .create_member(&NewPartnerMember {
                username: "second".to_string(),
                ..new_member
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "second");
    }
}
