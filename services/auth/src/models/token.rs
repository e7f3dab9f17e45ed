//! Server-side token records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a refresh token maps to in the token store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshRecord {
    pub username: String,
    pub external_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
