//! Identity provider integration (Discord OAuth2)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RequestTokenError, Scope, TokenResponse, TokenUrl, basic::BasicClient,
    reqwest::async_http_client,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{config::AuthConfig, error::AuthError};

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider answered and said no (bad code, revoked grant, ...)
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("identity provider did not answer in time")]
    Timeout,

    #[error("identity provider unreachable: {0}")]
    Transport(String),

    #[error("identity provider returned an unusable profile: {0}")]
    MalformedProfile(String),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(reason) => {
                warn!("Token exchange rejected: {}", reason);
                AuthError::UpstreamRejected("Failed to retrieve access token".to_string())
            }
            ProviderError::Timeout => {
                error!("Identity provider timed out");
                AuthError::ServiceUnavailable("Identity provider timed out".to_string())
            }
            ProviderError::Transport(reason) | ProviderError::MalformedProfile(reason) => {
                error!("Identity provider failure: {}", reason);
                AuthError::UpstreamUnavailable("Identity provider unavailable".to_string())
            }
        }
    }
}

/// The external user behind an authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub id: String,
    pub username: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider authorization URL carrying `state`
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a provider access token
    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

/// Discord OAuth2 client. Every outbound call is bounded by the configured
/// provider timeout.
#[derive(Clone)]
pub struct DiscordProvider {
    client: BasicClient,
    http: reqwest::Client,
    profile_url: String,
    scopes: Vec<String>,
    timeout: Duration,
}

impl DiscordProvider {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(config.authorize_url.clone())?,
            Some(TokenUrl::new(config.token_url.clone())?),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone())?);

        let timeout = Duration::from_secs(config.provider_timeout_seconds);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            http,
            profile_url: config.profile_url.clone(),
            scopes: config.scope_list(),
            timeout,
        })
    }
}

#[async_trait]
impl IdentityProvider for DiscordProvider {
    fn authorize_url(&self, state: &str) -> String {
        let state = state.to_string();
        let mut request = self.client.authorize_url(move || CsrfToken::new(state));
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, _) = request.url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        info!("Exchanging authorization code with Discord");

        let exchange = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client);

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|err| match err {
                RequestTokenError::ServerResponse(response) => {
                    ProviderError::Rejected(response.error().to_string())
                }
                RequestTokenError::Request(err) => ProviderError::Transport(err.to_string()),
                RequestTokenError::Parse(err, _) => ProviderError::Rejected(format!(
                    "no access token in response: {}",
                    err
                )),
                RequestTokenError::Other(reason) => ProviderError::Rejected(reason),
            })?;

        Ok(response.access_token().secret().clone())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
        let request = self.http.get(&self.profile_url).bearer_auth(access_token).send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ProviderError::Rejected(format!(
                "profile request returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "profile request returned {}",
                status
            )));
        }

        let user: DiscordUser = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedProfile(e.to_string()))?;
        if user.id.is_empty() {
            return Err(ProviderError::MalformedProfile("empty user id".to_string()));
        }

        Ok(ExternalProfile {
            id: user.id,
            username: user.username.unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}
