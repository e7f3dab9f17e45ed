//! Multi-tenant authentication service
//!
//! OAuth login for officers and partner storefronts, access/refresh token
//! issuance and revocation, and partner storefront sessions.

use std::sync::Arc;

use crate::{
    config::AuthConfig,
    flow::OAuthOrchestrator,
    jwt::JwtService,
    oauth::IdentityProvider,
    partner::PartnerSessionService,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{GuildDirectory, OrganizationRepository, PartnerRepository, TokenStore},
    tokens::TokenManager,
};

pub mod admin;
pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod oauth_state;
pub mod partner;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod tokens;
pub mod validation;

pub use routes::create_router;

/// External collaborators the service runs against
#[derive(Clone)]
pub struct Backends {
    pub provider: Arc<dyn IdentityProvider>,
    pub organizations: Arc<dyn OrganizationRepository>,
    pub partners: Arc<dyn PartnerRepository>,
    pub guilds: Arc<dyn GuildDirectory>,
    pub token_store: Arc<dyn TokenStore>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub tokens: TokenManager,
    pub flow: OAuthOrchestrator,
    pub partners: PartnerSessionService,
    pub organizations: Arc<dyn OrganizationRepository>,
    pub refresh_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AuthConfig, jwt_service: JwtService, backends: Backends) -> Self {
        let config = Arc::new(config);
        let tokens = TokenManager::new(jwt_service, backends.token_store.clone());
        let partners =
            PartnerSessionService::new(backends.partners.clone(), config.partner_session_hours);
        let flow = OAuthOrchestrator::new(
            config.clone(),
            backends.provider,
            backends.organizations.clone(),
            backends.guilds,
            backends.token_store,
            tokens.clone(),
            partners.clone(),
        );

        Self {
            config,
            tokens,
            flow,
            partners,
            organizations: backends.organizations,
            refresh_limiter: RateLimiter::new(RateLimiterConfig::default()),
        }
    }
}
