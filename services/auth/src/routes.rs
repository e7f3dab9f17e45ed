//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    AppState, admin,
    error::{AuthError, AuthResult},
    middleware::{AuthContext, auth_middleware},
    rate_limiter::client_key,
    validation::validate_app_name,
};

const PARTNER_SESSION_HEADER: &str = "x-partner-session";

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Body of `/refresh`, `/revoke` and `/logout`
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

impl RefreshTokenRequest {
    fn token(body: Option<Json<Self>>) -> Option<String> {
        body.and_then(|Json(body)| body.refresh_token)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    /// Present only when refresh tokens rotate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppTokenParams {
    pub appname: Option<String>,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/revoke", post(revoke))
        .route("/appToken", get(app_token))
        .route("/name", get(name))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/validToken", get(valid_token))
        .route("/validateToken", get(validate_token))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/partner/login/:org_prefix", get(partner_login))
        .route("/partner/session", get(partner_session))
        .merge(protected)
        .merge(admin::router(state.clone()))
        .with_state(state)
}

/// 302 to `location`
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Start the primary (officer) OAuth flow
pub async fn login(State(state): State<AppState>) -> AuthResult<Response> {
    let url = state.flow.login()?;
    Ok(found(&url))
}

/// Finish either OAuth flow
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AuthResult<Response> {
    let outcome = state
        .flow
        .callback(params.code.as_deref(), params.state.as_deref())
        .await?;
    Ok(found(outcome.redirect_url()))
}

/// 200 only for a valid, unexpired token
pub async fn valid_token(State(state): State<AppState>, bearer: BearerHeader) -> AuthResult<Response> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        let token = bearer.token();
        if state.tokens.is_token_valid(token).await? && !state.tokens.is_token_expired(token) {
            return Ok(Json(json!({"status": "success", "valid": true, "expired": false}))
                .into_response());
        }
    }

    Ok((
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "valid": false})),
    )
        .into_response())
}

/// Report validity and expiry as separate flags
pub async fn validate_token(
    State(state): State<AppState>,
    bearer: BearerHeader,
) -> AuthResult<Response> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        let token = bearer.token();
        if state.tokens.is_token_valid(token).await? {
            let expired = state.tokens.is_token_expired(token);
            info!("Token is valid (expired: {})", expired);
            return Ok(Json(json!({"status": "success", "valid": true, "expired": expired}))
                .into_response());
        }
    }

    warn!("Token validation failed (invalid)");
    Ok((
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "valid": false, "message": "Token is invalid"})),
    )
        .into_response())
}

/// Exchange a refresh token for a new access token
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> AuthResult<Json<RefreshTokenResponse>> {
    let Some(refresh_token) = RefreshTokenRequest::token(body) else {
        return Err(AuthError::bad_request("Refresh token required"));
    };

    let client = client_key(&headers);
    if state.refresh_limiter.is_blocked(&client).await {
        warn!("Refresh throttled for client {}", client);
        return Err(AuthError::TooManyRequests);
    }

    let response = if state.config.rotate_refresh_tokens {
        state
            .tokens
            .rotate_refresh_token(&refresh_token)
            .await?
            .map(|pair| RefreshTokenResponse {
                access_token: pair.access_token,
                token_type: "Bearer".to_string(),
                expires_in: pair.expires_in,
                refresh_token: Some(pair.refresh_token),
            })
    } else {
        state
            .tokens
            .refresh_access_token(&refresh_token)
            .await?
            .map(|access_token| RefreshTokenResponse {
                access_token,
                token_type: "Bearer".to_string(),
                expires_in: state.tokens.access_token_expiry(),
                refresh_token: None,
            })
    };

    match response {
        Some(response) => {
            state.refresh_limiter.clear(&client).await;
            Ok(Json(response))
        }
        None => {
            state.refresh_limiter.record_failure(&client).await;
            Err(AuthError::unauthorized("Invalid or expired refresh token"))
        }
    }
}

/// Revoke a refresh token and the access token presenting it
pub async fn revoke(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Option<Json<RefreshTokenRequest>>,
) -> AuthResult<impl IntoResponse> {
    let Some(refresh_token) = RefreshTokenRequest::token(body) else {
        return Err(AuthError::bad_request("Refresh token required"));
    };

    if !state.tokens.revoke_refresh_token(&refresh_token).await? {
        return Err(AuthError::bad_request("Invalid refresh token"));
    }
    state.tokens.delete_token(&auth.token).await?;

    info!("Tokens revoked for {}", auth.claims.sub);
    Ok(Json(json!({"message": "Token revoked successfully"})))
}

/// Best-effort logout: revoke whatever credentials were presented
pub async fn logout(
    State(state): State<AppState>,
    bearer: BearerHeader,
    body: Option<Json<RefreshTokenRequest>>,
) -> AuthResult<impl IntoResponse> {
    if let Some(refresh_token) = RefreshTokenRequest::token(body) {
        state.tokens.revoke_refresh_token(&refresh_token).await?;
    }

    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        state.tokens.delete_token(bearer.token()).await?;
    }

    Ok(Json(json!({"message": "Logged out successfully"})))
}

/// Mint a token for a downstream application
pub async fn app_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<AppTokenParams>,
) -> AuthResult<impl IntoResponse> {
    let app_name = params.appname.unwrap_or_default();
    validate_app_name(&app_name).map_err(AuthError::BadRequest)?;

    let Some(username) = state.tokens.retrieve_username(&auth.token) else {
        return Err(AuthError::unauthorized("Invalid user token"));
    };

    info!("Generating app token for user {}, app: {}", username, app_name);
    let app_token = state.tokens.generate_app_token(&username, &app_name)?;
    Ok(Json(json!({ "app_token": app_token })))
}

/// Username of the bearer
pub async fn name(Extension(auth): Extension<AuthContext>) -> impl IntoResponse {
    Json(json!({ "name": auth.claims.sub }))
}

/// Start a partner OAuth flow for `org_prefix`
pub async fn partner_login(
    State(state): State<AppState>,
    Path(org_prefix): Path<String>,
    headers: HeaderMap,
) -> AuthResult<Response> {
    let url = state.flow.partner_login(&org_prefix, &headers).await?;
    Ok(found(&url))
}

/// Describe the partner session named by `X-Partner-Session`
pub async fn partner_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse> {
    let token = headers
        .get(PARTNER_SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::unauthorized("Partner session required"))?;

    let session = state
        .partners
        .validate_partner_session(token)
        .await?
        .ok_or_else(|| AuthError::unauthorized("Invalid or expired partner session"))?;

    Ok(Json(json!({
        "member_id": session.partner_member_id,
        "organization_id": session.organization_id,
        "points_balance": session.points_balance,
        "expires_at": session.expires_at,
    })))
}
