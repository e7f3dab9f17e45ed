//! OAuth login orchestration
//!
//! ```text
//! ANONYMOUS --login/partner_login--> AWAITING_PROVIDER_CALLBACK
//! AWAITING_PROVIDER_CALLBACK --callback--> AUTHORIZED_OFFICER
//!                                        | AUTHORIZED_PARTNER
//!                                        | DENIED
//! ```
//!
//! Both flows carry their context in a signed state parameter. Business
//! denials end in a redirect, never in an HTTP error status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    config::AuthConfig,
    domain::{extract_origin, is_domain_authorized, with_query_params},
    error::{AuthError, AuthResult},
    oauth::{ExternalProfile, IdentityProvider},
    oauth_state::{FlowContext, PartnerContext, StateCodec},
    partner::{PartnerSessionService, build_error_redirect, build_success_redirect},
    repositories::{GuildDirectory, OrganizationRepository, TokenStore},
    tokens::TokenManager,
};

const INVALID_STATE: &str = "Invalid OAuth state";

/// Terminal state of a callback, with the redirect that reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    AuthorizedOfficer { redirect_url: String },
    AuthorizedPartner { redirect_url: String },
    Denied { redirect_url: String },
}

impl LoginOutcome {
    pub fn redirect_url(&self) -> &str {
        match self {
            LoginOutcome::AuthorizedOfficer { redirect_url }
            | LoginOutcome::AuthorizedPartner { redirect_url }
            | LoginOutcome::Denied { redirect_url } => redirect_url,
        }
    }
}

#[derive(Clone)]
pub struct OAuthOrchestrator {
    config: Arc<AuthConfig>,
    provider: Arc<dyn IdentityProvider>,
    organizations: Arc<dyn OrganizationRepository>,
    guilds: Arc<dyn GuildDirectory>,
    token_store: Arc<dyn TokenStore>,
    tokens: TokenManager,
    partners: PartnerSessionService,
    state_codec: StateCodec,
}

impl OAuthOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AuthConfig>,
        provider: Arc<dyn IdentityProvider>,
        organizations: Arc<dyn OrganizationRepository>,
        guilds: Arc<dyn GuildDirectory>,
        token_store: Arc<dyn TokenStore>,
        tokens: TokenManager,
        partners: PartnerSessionService,
    ) -> Self {
        let state_codec = StateCodec::new(&config.state_secret, config.state_ttl_seconds);
        Self {
            config,
            provider,
            organizations,
            guilds,
            token_store,
            tokens,
            partners,
            state_codec,
        }
    }

    /// Provider authorization URL for the primary (officer) flow
    pub fn login(&self) -> AuthResult<String> {
        let state = self
            .state_codec
            .encode(&FlowContext::Primary, BTreeMap::new())
            .map_err(AuthError::internal)?;
        info!("Redirecting to identity provider for primary login");
        Ok(self.provider.authorize_url(&state))
    }

    /// Provider authorization URL for a partner site of `org_prefix`
    pub async fn partner_login(&self, org_prefix: &str, headers: &HeaderMap) -> AuthResult<String> {
        let Some(origin_domain) = extract_origin(headers) else {
            warn!("Partner login attempted without origin domain");
            return Err(AuthError::bad_request(
                "Origin domain could not be determined",
            ));
        };

        let organization = self
            .organizations
            .find_by_prefix(org_prefix)
            .await?
            .filter(|org| org.accepts_partner_login())
            .ok_or_else(|| {
                warn!("Partner login attempted for invalid org prefix: {}", org_prefix);
                AuthError::NotFound(
                    "Organization not found, storefront not enabled, or OAuth not enabled"
                        .to_string(),
                )
            })?;

        let Some(callback_url) = organization
            .oauth_callback_url
            .clone()
            .filter(|url| !url.trim().is_empty())
        else {
            warn!("Partner login attempted for org without callback URL: {}", org_prefix);
            return Err(AuthError::bad_request(
                "OAuth callback URL not configured for this organization",
            ));
        };

        if !is_domain_authorized(&origin_domain, &organization.allowed_domains) {
            warn!(
                "Unauthorized domain {} attempted login for org {}",
                origin_domain, org_prefix
            );
            return Err(AuthError::Forbidden(
                "Domain not authorized for this organization".to_string(),
            ));
        }

        let context = FlowContext::Partner(PartnerContext {
            org_id: organization.id,
            org_prefix: organization.prefix.clone(),
            origin_domain: origin_domain.clone(),
            callback_url,
        });
        let state = self
            .state_codec
            .encode(&context, BTreeMap::new())
            .map_err(AuthError::internal)?;

        info!(
            "Starting partner OAuth flow for organization {} from domain {}",
            org_prefix, origin_domain
        );
        Ok(self.provider.authorize_url(&state))
    }

    /// Finish either flow after the provider redirects back
    pub async fn callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> AuthResult<LoginOutcome> {
        if !self.guilds.is_ready() {
            error!("Guild directory is not ready for /callback");
            return Err(AuthError::ServiceUnavailable(
                "Authentication service temporarily unavailable. Bot not ready.".to_string(),
            ));
        }

        let Some(code) = code.filter(|code| !code.is_empty()) else {
            warn!("No authorization code provided in /callback");
            return Err(AuthError::bad_request("No authorization code provided"));
        };

        let Some(state) = state.filter(|state| !state.is_empty()) else {
            warn!("Callback without OAuth state");
            return Err(AuthError::bad_request(INVALID_STATE));
        };
        let state = self.state_codec.decode(state, Utc::now()).map_err(|e| {
            warn!("Rejected OAuth state: {}", e);
            AuthError::bad_request(INVALID_STATE)
        })?;

        let ttl = self.state_codec.ttl().num_seconds().max(1) as u64;
        if !self.token_store.claim_state_nonce(&state.nonce, ttl).await? {
            warn!("Replayed OAuth state");
            return Err(AuthError::bad_request(INVALID_STATE));
        }

        info!("Received authorization code, exchanging for token");
        let provider_token = self.provider.exchange_code(code).await?;
        let profile = self.provider.fetch_profile(&provider_token).await?;

        match state.context {
            FlowContext::Primary => self.primary_callback(&profile).await,
            FlowContext::Partner(context) => self.partner_callback(&profile, &context).await,
        }
    }

    async fn primary_callback(&self, profile: &ExternalProfile) -> AuthResult<LoginOutcome> {
        let officer_guilds = self
            .guilds
            .officer_guilds(&profile.id, &self.config.superadmin_id)
            .await?;
        let auth_url = format!("{}/auth/", self.config.client_url.trim_end_matches('/'));

        if officer_guilds.is_empty() {
            info!("User {} is not an officer in any governed guild", profile.id);
            let redirect_url =
                with_query_params(&auth_url, &[("error", "Unauthorized Access".to_string())])
                    .map_err(AuthError::internal)?;
            return Ok(LoginOutcome::Denied { redirect_url });
        }

        let name = self
            .guilds
            .display_name(&profile.id)
            .await?
            .unwrap_or_else(|| profile.username.clone());
        let pair = self.tokens.issue_session_pair(&name, &profile.id).await?;

        info!(
            "Officer {} authorized for {} guilds",
            profile.id,
            officer_guilds.len()
        );
        let redirect_url = with_query_params(
            &auth_url,
            &[
                ("access_token", pair.access_token),
                ("refresh_token", pair.refresh_token),
            ],
        )
        .map_err(AuthError::internal)?;
        Ok(LoginOutcome::AuthorizedOfficer { redirect_url })
    }

    async fn partner_callback(
        &self,
        profile: &ExternalProfile,
        context: &PartnerContext,
    ) -> AuthResult<LoginOutcome> {
        info!(
            "Processing partner OAuth callback for org: {}",
            context.org_prefix
        );

        let organization = match self.organizations.find_by_id(context.org_id).await {
            Ok(organization) => organization,
            Err(e) => {
                error!("Organization lookup failed during partner callback: {}", e);
                return self.partner_failure(context, "authentication_failed");
            }
        };
        let Some(organization) = organization
            .filter(|org| org.is_active && org.prefix == context.org_prefix)
        else {
            error!(
                "Organization not found during partner callback: {}",
                context.org_prefix
            );
            return self.partner_failure(context, "Invalid organization");
        };

        let member = match self
            .partners
            .get_or_create_partner_member(&profile.id, &profile.username, organization.id)
            .await
        {
            Ok(member) => member,
            Err(e) => {
                error!(
                    "Failed to create partner member for {} in org {}: {}",
                    profile.id, context.org_prefix, e
                );
                return self.partner_failure(context, "Failed to create member");
            }
        };

        let session_token = match self
            .partners
            .generate_partner_session_token(&member, organization.id)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                error!("Error generating partner session token: {}", e);
                return self.partner_failure(context, "authentication_failed");
            }
        };

        match build_success_redirect(
            &context.callback_url,
            &session_token,
            &member,
            &context.org_prefix,
        ) {
            Ok(redirect_url) => {
                info!("Redirecting partner member {} to callback", member.id);
                Ok(LoginOutcome::AuthorizedPartner { redirect_url })
            }
            Err(e) => {
                error!("Partner callback URL is unusable: {}", e);
                Err(AuthError::bad_request("authentication_failed"))
            }
        }
    }

    fn partner_failure(&self, context: &PartnerContext, message: &str) -> AuthResult<LoginOutcome> {
        match build_error_redirect(&context.callback_url, message) {
            Ok(redirect_url) => Ok(LoginOutcome::Denied { redirect_url }),
            Err(_) => Err(AuthError::bad_request(message)),
        }
    }
}
