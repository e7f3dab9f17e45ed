//! Bearer token authentication for protected routes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    jwt::Claims,
};

/// The verified caller, available to handlers behind [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub token: String,
    pub claims: Claims,
}

/// Require a bearer token that is valid, unrevoked and unexpired
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, bearer).await {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

async fn authenticate(
    state: &AppState,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AuthResult<AuthContext> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AuthError::unauthorized("Missing bearer token"));
    };
    let token = bearer.token();

    if !state.tokens.is_token_valid(token).await? || state.tokens.is_token_expired(token) {
        warn!("Rejected bearer token");
        return Err(AuthError::unauthorized("Invalid or expired token"));
    }

    let claims = state
        .tokens
        .decode_token(token)
        .ok_or_else(|| AuthError::unauthorized("Invalid or expired token"))?;

    Ok(AuthContext {
        token: token.to_string(),
        claims,
    })
}

/// Require the configured superadmin. Must run inside [`auth_middleware`].
pub async fn superadmin_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let is_superadmin = req
        .extensions()
        .get::<AuthContext>()
        .and_then(|context| context.claims.external_id.as_deref())
        .is_some_and(|id| !state.config.superadmin_id.is_empty() && id == state.config.superadmin_id);

    if !is_superadmin {
        warn!("Non-superadmin attempted a superadmin operation");
        return AuthError::Forbidden("Superadmin access required".to_string()).into_response();
    }

    next.run(req).await
}
