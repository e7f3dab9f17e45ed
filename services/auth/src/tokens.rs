//! Token manager
//!
//! The single authority for issuing, validating, refreshing and revoking
//! bearer credentials. Access tokens are self-contained JWTs; refresh
//! tokens are opaque random strings kept in the token store under their
//! SHA-256 digest.
//!
//! Validity and expiry are separate predicates: a token can verify and be
//! unrevoked yet be past its `exp`.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    error::{AuthError, StoreError},
    jwt::{Claims, JwtService},
    models::RefreshRecord,
    repositories::TokenStore,
};

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::internal(err)
    }
}

/// Access and refresh token issued together at login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// 32 random bytes from the OS, base64url without padding
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(value.min(i64::MAX as u64) as i64)
}

#[derive(Clone)]
pub struct TokenManager {
    jwt: JwtService,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(jwt: JwtService, store: Arc<dyn TokenStore>) -> Self {
        Self { jwt, store }
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry(&self) -> u64 {
        self.jwt.access_token_expiry()
    }

    /// Issue an access/refresh pair with explicit lifetimes
    pub async fn generate_token_pair(
        &self,
        username: &str,
        external_id: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<TokenPair, TokenError> {
        let (access_token, _) = self
            .jwt
            .issue_access_token(username, external_id, access_ttl)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let refresh_token = random_token();
        let now = Utc::now();
        let record = RefreshRecord {
            username: username.to_string(),
            external_id: external_id.to_string(),
            issued_at: now,
            expires_at: now + refresh_ttl,
        };
        self.store
            .put_refresh(
                &sha256_hex(&refresh_token),
                &record,
                refresh_ttl.num_seconds().max(1) as u64,
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl.num_seconds().max(0) as u64,
        })
    }

    /// Issue a pair with the configured lifetimes (30 minutes / 7 days by default)
    pub async fn issue_session_pair(
        &self,
        username: &str,
        external_id: &str,
    ) -> Result<TokenPair, TokenError> {
        self.generate_token_pair(
            username,
            external_id,
            seconds(self.jwt.access_token_expiry()),
            seconds(self.jwt.refresh_token_expiry()),
        )
        .await
    }

    /// Signature and issuer verify, and the token id is not revoked.
    /// Expiry is not considered.
    pub async fn is_token_valid(&self, token: &str) -> Result<bool, TokenError> {
        let Some(claims) = self.decode_token(token) else {
            return Ok(false);
        };

        if self.store.is_access_revoked(&claims.jti).await? {
            debug!("Token {} is revoked", claims.jti);
            return Ok(false);
        }

        Ok(true)
    }

    /// Clock comparison against `exp`. Tokens without `exp` never expire;
    /// tokens that do not decode count as expired.
    pub fn is_token_expired(&self, token: &str) -> bool {
        self.is_token_expired_at(token, Utc::now())
    }

    pub fn is_token_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.decode_token(token) {
            Some(claims) => claims.exp.is_some_and(|exp| exp <= now.timestamp()),
            None => true,
        }
    }

    /// Mint a new access token for the owner of `refresh_token`
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<String>, TokenError> {
        let token_hash = sha256_hex(refresh_token);
        let Some(record) = self.live_refresh_record(&token_hash).await? else {
            return Ok(None);
        };

        let (access_token, _) = self
            .jwt
            .issue_access_token(
                &record.username,
                &record.external_id,
                seconds(self.jwt.access_token_expiry()),
            )
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(Some(access_token))
    }

    /// Exchange a refresh token for a new pair, retiring the old one.
    ///
    /// The old token is deleted first; if it was already gone (revoked or
    /// used by a concurrent request) no pair is issued.
    pub async fn rotate_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<TokenPair>, TokenError> {
        let token_hash = sha256_hex(refresh_token);
        let Some(record) = self.live_refresh_record(&token_hash).await? else {
            return Ok(None);
        };

        if !self.store.delete_refresh(&token_hash).await? {
            warn!("Refresh token was consumed concurrently during rotation");
            return Ok(None);
        }

        let pair = self
            .issue_session_pair(&record.username, &record.external_id)
            .await?;
        info!("Rotated refresh token for {}", record.username);
        Ok(Some(pair))
    }

    /// Remove a refresh token. Returns `false` if it did not exist.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool, TokenError> {
        Ok(self
            .store
            .delete_refresh(&sha256_hex(refresh_token))
            .await?)
    }

    /// Put an access or app token on the revocation list.
    ///
    /// The entry outlives the token's own expiry by the refresh window, so
    /// an expired token keeps reporting as invalid. Tokens without `exp`
    /// stay revoked permanently. Returns `false` for tokens that do not
    /// decode.
    pub async fn delete_token(&self, token: &str) -> Result<bool, TokenError> {
        let Some(claims) = self.decode_token(token) else {
            return Ok(false);
        };

        let ttl = claims.exp.map(|exp| {
            let remaining = (exp - Utc::now().timestamp()).max(0) as u64;
            remaining.saturating_add(self.jwt.refresh_token_expiry())
        });
        self.store.revoke_access(&claims.jti, ttl).await?;
        info!("Revoked token {} for {}", claims.jti, claims.sub);
        Ok(true)
    }

    pub fn retrieve_username(&self, token: &str) -> Option<String> {
        self.decode_token(token).map(|claims| claims.sub)
    }

    /// Verify and decode without side effects. Failures are logged by cause
    /// and collapse to `None`.
    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        match self.jwt.decode(token) {
            Ok(claims) => Some(claims),
            Err(err) => {
                match err.kind() {
                    ErrorKind::InvalidSignature => debug!("Token rejected: bad signature"),
                    ErrorKind::InvalidIssuer => debug!("Token rejected: foreign issuer"),
                    ErrorKind::InvalidAlgorithm => debug!("Token rejected: wrong algorithm"),
                    ErrorKind::MissingRequiredClaim(claim) => {
                        debug!("Token rejected: missing claim {}", claim)
                    }
                    _ => debug!("Token rejected: malformed ({})", err),
                }
                None
            }
        }
    }

    /// Non-expiring token scoped to a downstream application
    pub fn generate_app_token(&self, username: &str, app_name: &str) -> Result<String, TokenError> {
        self.jwt
            .issue_app_token(username, app_name, None)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    async fn live_refresh_record(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshRecord>, TokenError> {
        let Some(record) = self.store.get_refresh(token_hash).await? else {
            debug!("Refresh token not found");
            return Ok(None);
        };

        if record.is_expired(Utc::now()) {
            debug!("Refresh token expired for {}", record.username);
            self.store.delete_refresh(token_hash).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::secret_config;
    use crate::repositories::MemoryTokenStore;

    fn manager() -> TokenManager {
        TokenManager::new(
            JwtService::new(secret_config()).unwrap(),
            Arc::new(MemoryTokenStore::new()),
        )
    }

    #[tokio::test]
    async fn fresh_pair_is_valid_and_unexpired() {
        let tokens = manager();
        let pair = tokens.issue_session_pair("ada", "1234").await.unwrap();

        assert!(tokens.is_token_valid(&pair.access_token).await.unwrap());
        assert!(!tokens.is_token_expired(&pair.access_token));
        assert_eq!(pair.expires_in, 1800);
        assert_ne!(pair.refresh_token, pair.access_token);
        assert!(URL_SAFE_NO_PAD.decode(&pair.refresh_token).unwrap().len() >= 32);
    }

    #[tokio::test]
    async fn expired_tokens_are_still_valid() {
        let tokens = manager();
        let pair = tokens
            .generate_token_pair("ada", "1234", Duration::minutes(-1), Duration::days(7))
            .await
            .unwrap();

        assert!(tokens.is_token_valid(&pair.access_token).await.unwrap());
        assert!(tokens.is_token_expired(&pair.access_token));
    }

    #[tokio::test]
    async fn revoked_tokens_are_invalid_regardless_of_expiry() {
        let tokens = manager();
        let live = tokens.issue_session_pair("ada", "1234").await.unwrap();
        let stale = tokens
            .generate_token_pair("ada", "1234", Duration::minutes(-1), Duration::days(7))
            .await
            .unwrap();

        assert!(tokens.delete_token(&live.access_token).await.unwrap());
        assert!(tokens.delete_token(&stale.access_token).await.unwrap());

        assert!(!tokens.is_token_valid(&live.access_token).await.unwrap());
        assert!(!tokens.is_token_valid(&stale.access_token).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_is_neither_valid_nor_revocable() {
        let tokens = manager();
        assert!(!tokens.is_token_valid("not-a-token").await.unwrap());
        assert!(tokens.is_token_expired("not-a-token"));
        assert!(!tokens.delete_token("not-a-token").await.unwrap());
        assert_eq!(tokens.retrieve_username("not-a-token"), None);
    }

    #[tokio::test]
    async fn refresh_mints_token_for_same_subject() {
        let tokens = manager();
        let pair = tokens.issue_session_pair("ada", "1234").await.unwrap();

        let access = tokens
            .refresh_access_token(&pair.refresh_token)
            .await
            .unwrap()
            .unwrap();
        let claims = tokens.decode_token(&access).unwrap();
        assert_eq!(claims.sub, "ada");
        assert_eq!(claims.external_id.as_deref(), Some("1234"));
        assert_ne!(access, pair.access_token);

        // without rotation the refresh token keeps working
        assert!(
            tokens
                .refresh_access_token(&pair.refresh_token)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn refresh_fails_for_unknown_revoked_or_expired_tokens() {
        let tokens = manager();
        assert_eq!(tokens.refresh_access_token("nope").await.unwrap(), None);

        let pair = tokens.issue_session_pair("ada", "1234").await.unwrap();
        assert!(tokens.revoke_refresh_token(&pair.refresh_token).await.unwrap());
        assert!(!tokens.revoke_refresh_token(&pair.refresh_token).await.unwrap());
        assert_eq!(
            tokens
                .refresh_access_token(&pair.refresh_token)
                .await
                .unwrap(),
            None
        );

        let expired = tokens
            .generate_token_pair("ada", "1234", Duration::minutes(30), Duration::seconds(-5))
            .await
            .unwrap();
        assert_eq!(
            tokens
                .refresh_access_token(&expired.refresh_token)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn rotation_retires_the_presented_token() {
        let tokens = manager();
        let pair = tokens.issue_session_pair("ada", "1234").await.unwrap();

        let rotated = tokens
            .rotate_refresh_token(&pair.refresh_token)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_eq!(
            tokens.retrieve_username(&rotated.access_token).as_deref(),
            Some("ada")
        );

        assert!(
            tokens
                .rotate_refresh_token(&pair.refresh_token)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            tokens
                .refresh_access_token(&rotated.refresh_token)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn app_tokens_never_expire() {
        let tokens = manager();
        let app = tokens.generate_app_token("ada", "scoreboard").unwrap();

        assert!(tokens.is_token_valid(&app).await.unwrap());
        assert!(!tokens.is_token_expired_at(&app, Utc::now() + Duration::days(3650)));
        assert_eq!(
            tokens.decode_token(&app).unwrap().app.as_deref(),
            Some("scoreboard")
        );

        assert!(tokens.delete_token(&app).await.unwrap());
        assert!(!tokens.is_token_valid(&app).await.unwrap());
    }

    #[test]
    fn refresh_tokens_are_hashed_before_storage() {
        let digest = sha256_hex("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(random_token(), random_token());
    }
}
