//! Redis-backed token store

use async_trait::async_trait;
use common::cache::RedisPool;

use crate::{error::StoreError, models::RefreshRecord, repositories::TokenStore};

fn refresh_key(token_hash: &str) -> String {
    format!("refresh_token:{}", token_hash)
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklisted_token:{}", jti)
}

fn nonce_key(nonce: &str) -> String {
    format!("oauth_state:{}", nonce)
}

/// Token store on top of the shared Redis client. Every key carries a TTL
/// except revocations of non-expiring tokens.
#[derive(Clone)]
pub struct RedisTokenStore {
    redis_pool: RedisPool,
}

impl RedisTokenStore {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put_refresh(
        &self,
        token_hash: &str,
        record: &RefreshRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let value =
            serde_json::to_string(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.redis_pool
            .set(&refresh_key(token_hash), &value, Some(ttl_seconds))
            .await?;
        Ok(())
    }

    async fn get_refresh(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let Some(value) = self.redis_pool.get(&refresh_key(token_hash)).await? else {
            return Ok(None);
        };
        let record =
            serde_json::from_str(&value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Some(record))
    }

    async fn delete_refresh(&self, token_hash: &str) -> Result<bool, StoreError> {
        Ok(self.redis_pool.delete(&refresh_key(token_hash)).await?)
    }

    async fn revoke_access(&self, jti: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        self.redis_pool
            .set(&blacklist_key(jti), "1", ttl_seconds)
            .await?;
        Ok(())
    }

    async fn is_access_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.redis_pool.exists(&blacklist_key(jti)).await?)
    }

    async fn claim_state_nonce(&self, nonce: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        Ok(self
            .redis_pool
            .set_if_absent(&nonce_key(nonce), "1", ttl_seconds)
            .await?)
    }
}
