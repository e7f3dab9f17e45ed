//! Service configuration
//!
//! Built once at startup and handed to each component; nothing reads the
//! environment after that.

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const MIN_STATE_SECRET_LEN: usize = 32;

/// Settings for the OAuth flows and the HTTP surface.
///
/// Loaded from `AUTH_*` environment variables, e.g. `AUTH_CLIENT_ID`,
/// `AUTH_CLIENT_SECRET`, `AUTH_REDIRECT_URI`, `AUTH_CLIENT_URL`,
/// `AUTH_SUPERADMIN_ID`, `AUTH_STATE_SECRET`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Identity provider client id
    pub client_id: String,
    /// Identity provider client secret
    pub client_secret: String,
    /// Redirect URI registered with the identity provider (our `/callback`)
    pub redirect_uri: String,
    /// Front-end base URL that receives the officer token pair
    pub client_url: String,
    /// External id that is treated as an officer of every organization
    pub superadmin_id: String,
    /// HMAC key for the OAuth state envelope
    pub state_secret: String,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// Upper bound for each outbound call to the identity provider
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,
    #[serde(default)]
    pub rotate_refresh_tokens: bool,
    #[serde(default = "default_partner_session_hours")]
    pub partner_session_hours: i64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
}

fn default_state_ttl() -> i64 {
    600
}

fn default_provider_timeout() -> u64 {
    5
}

fn default_partner_session_hours() -> i64 {
    24
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_authorize_url() -> String {
    "https://discord.com/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://discord.com/api/v10/oauth2/token".to_string()
}

fn default_profile_url() -> String {
    "https://discord.com/api/v10/users/@me".to_string()
}

fn default_scopes() -> String {
    "identify guilds".to_string()
}

impl AuthConfig {
    /// Load the configuration from `AUTH_*` environment variables
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("AUTH"))
            .build()
            .context("failed to read AUTH_* environment")?;

        let config: AuthConfig = settings
            .try_deserialize()
            .context("invalid AUTH_* configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.state_secret.len() < MIN_STATE_SECRET_LEN {
            anyhow::bail!("AUTH_STATE_SECRET must be at least {MIN_STATE_SECRET_LEN} bytes");
        }
        if self.state_ttl_seconds <= 0 {
            anyhow::bail!("AUTH_STATE_TTL_SECONDS must be positive");
        }
        if self.provider_timeout_seconds == 0 {
            anyhow::bail!("AUTH_PROVIDER_TIMEOUT_SECONDS must be positive");
        }
        url::Url::parse(&self.client_url).context("AUTH_CLIENT_URL is not a valid URL")?;
        url::Url::parse(&self.redirect_uri).context("AUTH_REDIRECT_URI is not a valid URL")?;
        Ok(())
    }

    /// Scopes requested from the identity provider
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(str::to_string).collect()
    }

    /// Fixed configuration for tests and local experiments
    pub fn for_tests() -> Self {
        Self {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            client_url: "http://localhost:5173".to_string(),
            superadmin_id: "1000".to_string(),
            state_secret: "0123456789abcdef0123456789abcdef".to_string(),
            state_ttl_seconds: default_state_ttl(),
            provider_timeout_seconds: default_provider_timeout(),
            rotate_refresh_tokens: false,
            partner_session_hours: default_partner_session_hours(),
            bind_addr: default_bind_addr(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            profile_url: default_profile_url(),
            scopes: default_scopes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const REQUIRED: [(&str, &str); 6] = [
        ("AUTH_CLIENT_ID", "client"),
        ("AUTH_CLIENT_SECRET", "secret"),
        ("AUTH_REDIRECT_URI", "https://api.example.org/callback"),
        ("AUTH_CLIENT_URL", "https://app.example.org"),
        ("AUTH_SUPERADMIN_ID", "42"),
        ("AUTH_STATE_SECRET", "an-hmac-key-that-is-long-enough-for-us"),
    ];

    fn set_required() {
        for (key, value) in REQUIRED {
            unsafe { std::env::set_var(key, value) };
        }
    }

    fn clear_all() {
        for (key, _) in REQUIRED {
            unsafe { std::env::remove_var(key) };
        }
        unsafe {
            std::env::remove_var("AUTH_STATE_TTL_SECONDS");
            std::env::remove_var("AUTH_ROTATE_REFRESH_TOKENS");
        }
    }

    #[test]
    #[serial]
    fn loads_required_values_and_defaults() {
        set_required();

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.client_id, "client");
        assert_eq!(config.superadmin_id, "42");
        assert_eq!(config.state_ttl_seconds, 600);
        assert_eq!(config.provider_timeout_seconds, 5);
        assert!(!config.rotate_refresh_tokens);
        assert_eq!(config.scope_list(), vec!["identify", "guilds"]);

        clear_all();
    }

    #[test]
    #[serial]
    fn overrides_are_parsed() {
        set_required();
        unsafe {
            std::env::set_var("AUTH_STATE_TTL_SECONDS", "120");
            std::env::set_var("AUTH_ROTATE_REFRESH_TOKENS", "true");
        }

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.state_ttl_seconds, 120);
        assert!(config.rotate_refresh_tokens);

        clear_all();
    }

    #[test]
    #[serial]
    fn short_state_secret_is_rejected() {
        set_required();
        unsafe { std::env::set_var("AUTH_STATE_SECRET", "short") };

        assert!(AuthConfig::from_env().is_err());

        clear_all();
    }

    #[test]
    #[serial]
    fn missing_client_id_is_rejected() {
        clear_all();
        assert!(AuthConfig::from_env().is_err());
    }
}
