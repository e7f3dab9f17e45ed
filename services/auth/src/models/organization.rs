//! Organization model as consumed by the authentication core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Tenant boundary. Owned by the organizations collaborator; the core only
/// reads it and updates its OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    /// URL-safe unique prefix
    pub prefix: String,
    pub guild_id: String,
    pub is_active: bool,
    pub storefront_enabled: bool,
    pub oauth_enabled: bool,
    pub oauth_callback_url: Option<String>,
    pub allowed_domains: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Whether partner sites may start an OAuth flow for this organization
    pub fn accepts_partner_login(&self) -> bool {
        self.is_active && self.storefront_enabled && self.oauth_enabled
    }
}

/// OAuth-related view of an organization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthSettings {
    pub oauth_enabled: bool,
    pub oauth_callback_url: Option<String>,
    pub allowed_domains: Vec<String>,
}

impl From<&Organization> for OAuthSettings {
    fn from(org: &Organization) -> Self {
        Self {
            oauth_enabled: org.oauth_enabled,
            oauth_callback_url: org.oauth_callback_url.clone(),
            allowed_domains: org.allowed_domains.clone(),
        }
    }
}

/// An allow-listed change to an organization's OAuth settings.
///
/// Each variant is validated before it reaches the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum OAuthSettingsUpdate {
    /// Replace every OAuth setting at once
    Full {
        oauth_enabled: bool,
        oauth_callback_url: Option<String>,
        allowed_domains: Vec<String>,
    },
    AllowedDomains(Vec<String>),
    CallbackUrl(String),
}

impl OAuthSettingsUpdate {
    /// Apply the update to a settings snapshot
    pub fn apply(&self, settings: &mut OAuthSettings) {
        match self {
            OAuthSettingsUpdate::Full {
                oauth_enabled,
                oauth_callback_url,
                allowed_domains,
            } => {
                settings.oauth_enabled = *oauth_enabled;
                settings.oauth_callback_url = oauth_callback_url.clone();
                settings.allowed_domains = allowed_domains.clone();
            }
            OAuthSettingsUpdate::AllowedDomains(domains) => {
                settings.allowed_domains = domains.clone();
            }
            OAuthSettingsUpdate::CallbackUrl(url) => {
                settings.oauth_callback_url = Some(url.clone());
            }
        }
    }
}
