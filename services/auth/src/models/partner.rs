//! Partner member and partner session models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A partner-site end user, unique per (external id, organization)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PartnerMember {
    pub id: i64,
    pub external_id: String,
    pub organization_id: i64,
    pub username: String,
    /// Placeholder derived from the external id; not a real contact channel
    pub email: String,
    pub auth_provider: String,
    /// Current points balance, computed by the store
    pub points_balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New partner member payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPartnerMember {
    pub external_id: String,
    pub organization_id: i64,
    pub username: String,
    pub email: String,
    pub auth_provider: String,
}

/// Ephemeral credential for partner storefront access
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PartnerSession {
    pub session_token: String,
    pub partner_member_id: i64,
    pub organization_id: i64,
    /// Balance at the time the session was issued
    pub points_balance: f64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PartnerSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
