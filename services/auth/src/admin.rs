//! Superadmin management of organization OAuth settings

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::{auth_middleware, superadmin_middleware},
    models::{OAuthSettings, OAuthSettingsUpdate, Organization},
    validation::{is_valid_domain, sanitize_domain_list, validate_callback_url},
};

#[derive(Debug, Deserialize)]
pub struct UpdateOAuthRequest {
    pub oauth_enabled: bool,
    pub oauth_callback_url: Option<String>,
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDomainsRequest {
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCallbackRequest {
    pub oauth_callback_url: String,
}

impl TryFrom<UpdateOAuthRequest> for OAuthSettingsUpdate {
    type Error = AuthError;

    fn try_from(request: UpdateOAuthRequest) -> Result<Self, Self::Error> {
        let oauth_callback_url = request
            .oauth_callback_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &oauth_callback_url {
            validate_callback_url(url)
                .map_err(|e| AuthError::bad_request(format!("Invalid callback URL: {e}")))?;
        }

        Ok(OAuthSettingsUpdate::Full {
            oauth_enabled: request.oauth_enabled,
            oauth_callback_url,
            allowed_domains: sanitize_domain_list(&request.allowed_domains.unwrap_or_default()),
        })
    }
}

impl From<UpdateDomainsRequest> for OAuthSettingsUpdate {
    fn from(request: UpdateDomainsRequest) -> Self {
        OAuthSettingsUpdate::AllowedDomains(sanitize_domain_list(&request.allowed_domains))
    }
}

impl TryFrom<UpdateCallbackRequest> for OAuthSettingsUpdate {
    type Error = AuthError;

    fn try_from(request: UpdateCallbackRequest) -> Result<Self, Self::Error> {
        let url = request.oauth_callback_url.trim().to_string();
        validate_callback_url(&url)
            .map_err(|e| AuthError::bad_request(format!("Invalid callback URL: {e}")))?;
        Ok(OAuthSettingsUpdate::CallbackUrl(url))
    }
}

/// Result of checking an organization's OAuth configuration
#[derive(Debug, Serialize, PartialEq)]
pub struct OAuthConfigReport {
    pub oauth_enabled: bool,
    pub has_callback_url: bool,
    pub has_allowed_domains: bool,
    pub domains_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url_error: Option<String>,
    pub valid_domains: Vec<String>,
    pub invalid_domains: Vec<String>,
    pub all_domains_valid: bool,
}

impl From<&Organization> for OAuthConfigReport {
    fn from(org: &Organization) -> Self {
        let callback = org
            .oauth_callback_url
            .as_deref()
            .filter(|url| !url.is_empty());
        let callback_check = callback.map(validate_callback_url);

        let (valid_domains, invalid_domains): (Vec<String>, Vec<String>) = org
            .allowed_domains
            .iter()
            .cloned()
            .partition(|domain| is_valid_domain(domain));

        Self {
            oauth_enabled: org.oauth_enabled,
            has_callback_url: callback.is_some(),
            has_allowed_domains: !org.allowed_domains.is_empty(),
            domains_count: org.allowed_domains.len(),
            callback_url_valid: callback_check.as_ref().map(Result::is_ok),
            callback_url_error: callback_check.and_then(Result::err),
            all_domains_valid: invalid_domains.is_empty(),
            valid_domains,
            invalid_domains,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OAuthSummary {
    pub total_organizations: usize,
    pub oauth_enabled_count: usize,
    pub oauth_configured_count: usize,
    pub organizations_with_domains: usize,
    pub organizations_with_callbacks: usize,
    pub organizations_details: Vec<serde_json::Value>,
}

impl OAuthSummary {
    fn from_organizations(organizations: &[Organization]) -> Self {
        let has_callback =
            |org: &Organization| org.oauth_callback_url.as_deref().is_some_and(|u| !u.is_empty());

        Self {
            total_organizations: organizations.len(),
            oauth_enabled_count: organizations.iter().filter(|o| o.oauth_enabled).count(),
            oauth_configured_count: organizations
                .iter()
                .filter(|o| o.oauth_enabled && has_callback(o) && !o.allowed_domains.is_empty())
                .count(),
            organizations_with_domains: organizations
                .iter()
                .filter(|o| !o.allowed_domains.is_empty())
                .count(),
            organizations_with_callbacks: organizations.iter().filter(|o| has_callback(o)).count(),
            organizations_details: organizations
                .iter()
                .map(|org| {
                    json!({
                        "id": org.id,
                        "name": org.name,
                        "prefix": org.prefix,
                        "oauth_enabled": org.oauth_enabled,
                        "oauth_callback_url": org.oauth_callback_url,
                        "allowed_domains": org.allowed_domains,
                        "storefront_enabled": org.storefront_enabled,
                        "is_active": org.is_active,
                    })
                })
                .collect(),
        }
    }
}

/// Superadmin routes. Bearer authentication runs first, then the
/// superadmin check.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/superadmin/organizations/:id/oauth",
            get(get_oauth_settings).put(update_oauth_settings),
        )
        .route("/superadmin/organizations/:id/domains", put(update_domains))
        .route("/superadmin/organizations/:id/callback", put(update_callback))
        .route("/superadmin/organizations/:id/oauth/test", post(test_oauth))
        .route("/superadmin/organizations/oauth/summary", get(oauth_summary))
        .route_layer(from_fn_with_state(state.clone(), superadmin_middleware))
        .route_layer(from_fn_with_state(state, auth_middleware))
}

fn not_found() -> AuthError {
    AuthError::NotFound("Organization not found".to_string())
}

async fn apply_update(
    state: &AppState,
    id: i64,
    update: OAuthSettingsUpdate,
) -> AuthResult<Organization> {
    let organization = state
        .organizations
        .update_oauth_settings(id, &update)
        .await?
        .ok_or_else(not_found)?;
    info!("Updated OAuth settings for organization {}", organization.prefix);
    Ok(organization)
}

pub async fn get_oauth_settings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AuthResult<Json<OAuthSettings>> {
    let organization = state
        .organizations
        .find_by_id(id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(OAuthSettings::from(&organization)))
}

pub async fn update_oauth_settings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateOAuthRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|_| {
        AuthError::bad_request("Missing required fields: oauth_enabled, oauth_callback_url")
    })?;
    let organization = apply_update(&state, id, request.try_into()?).await?;

    Ok(Json(json!({
        "message": format!("OAuth settings updated successfully for {}", organization.name),
        "organization": organization,
    })))
}

pub async fn update_domains(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateDomainsRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let Json(request) =
        payload.map_err(|_| AuthError::bad_request("allowed_domains must be a list"))?;
    let organization = apply_update(&state, id, request.into()).await?;

    Ok(Json(json!({
        "message": format!("Allowed domains updated successfully for {}", organization.name),
        "allowed_domains": organization.allowed_domains,
    })))
}

pub async fn update_callback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateCallbackRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let Json(request) =
        payload.map_err(|_| AuthError::bad_request("oauth_callback_url field required"))?;
    let organization = apply_update(&state, id, request.try_into()?).await?;

    Ok(Json(json!({
        "message": format!("Callback URL updated successfully for {}", organization.name),
        "oauth_callback_url": organization.oauth_callback_url,
    })))
}

pub async fn test_oauth(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AuthResult<impl IntoResponse> {
    let organization = state
        .organizations
        .find_by_id(id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(json!({
        "organization": organization.name,
        "oauth_config": OAuthConfigReport::from(&organization),
    })))
}

pub async fn oauth_summary(State(state): State<AppState>) -> AuthResult<Json<OAuthSummary>> {
    let organizations = state.organizations.list().await?;
    Ok(Json(OAuthSummary::from_organizations(&organizations)))
}
