//! Partner members and partner storefront sessions

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::{
    domain::with_query_params,
    error::StoreError,
    models::{NewPartnerMember, PartnerMember, PartnerSession},
    repositories::PartnerRepository,
    tokens::random_token,
};

const AUTH_PROVIDER: &str = "discord";

#[derive(Clone)]
pub struct PartnerSessionService {
    partners: Arc<dyn PartnerRepository>,
    session_ttl: Duration,
}

impl PartnerSessionService {
    pub fn new(partners: Arc<dyn PartnerRepository>, session_hours: i64) -> Self {
        Self {
            partners,
            session_ttl: Duration::hours(session_hours),
        }
    }

    /// Find the member for (external id, organization), refreshing the
    /// username, or create it with a placeholder email.
    pub async fn get_or_create_partner_member(
        &self,
        external_id: &str,
        username: &str,
        organization_id: i64,
    ) -> Result<PartnerMember, StoreError> {
        if let Some(member) = self
            .partners
            .find_member(external_id, organization_id)
            .await?
        {
            let member = self.partners.touch_member(member.id, username).await?;
            info!("Found existing partner member: {}", member.id);
            return Ok(member);
        }

        let member = self
            .partners
            .create_member(&NewPartnerMember {
                external_id: external_id.to_string(),
                organization_id,
                username: username.to_string(),
                email: format!("{}@discord.temp", external_id),
                auth_provider: AUTH_PROVIDER.to_string(),
            })
            .await?;
        info!(
            "Created partner member {} for external id {} in organization {}",
            member.id, external_id, organization_id
        );
        Ok(member)
    }

    /// Prune the member's expired sessions and issue a new one
    pub async fn generate_partner_session_token(
        &self,
        member: &PartnerMember,
        organization_id: i64,
    ) -> Result<String, StoreError> {
        let now = Utc::now();
        let purged = self
            .partners
            .purge_expired_sessions(member.id, now)
            .await?;
        if purged > 0 {
            info!(
                "Purged {} expired sessions for partner member {}",
                purged, member.id
            );
        }

        let session = PartnerSession {
            session_token: random_token(),
            partner_member_id: member.id,
            organization_id,
            points_balance: member.points_balance,
            expires_at: now + self.session_ttl,
            created_at: now,
        };
        self.partners.create_session(&session).await?;

        info!("Generated session token for partner member: {}", member.id);
        Ok(session.session_token)
    }

    /// The live session behind a token, if any
    pub async fn validate_partner_session(
        &self,
        session_token: &str,
    ) -> Result<Option<PartnerSession>, StoreError> {
        let Some(session) = self.partners.find_session(session_token).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            warn!(
                "Expired partner session presented for member {}",
                session.partner_member_id
            );
            return Ok(None);
        }

        Ok(Some(session))
    }
}

/// Redirect back to the partner site with the new session
pub fn build_success_redirect(
    callback_url: &str,
    session_token: &str,
    member: &PartnerMember,
    org_prefix: &str,
) -> Result<String, url::ParseError> {
    with_query_params(
        callback_url,
        &[
            ("session_token", session_token.to_string()),
            ("member_id", member.id.to_string()),
            ("points_balance", member.points_balance.to_string()),
            ("org_prefix", org_prefix.to_string()),
            ("success", "true".to_string()),
        ],
    )
}

/// Redirect back to the partner site with an error
pub fn build_error_redirect(callback_url: &str, error: &str) -> Result<String, url::ParseError> {
    with_query_params(
        callback_url,
        &[("error", error.to_string()), ("success", "false".to_string())],
    )
}
