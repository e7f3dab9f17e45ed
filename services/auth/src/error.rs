//! Error types for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure of a persistence collaborator (PostgreSQL, Redis or in-memory)
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store failed
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<common::error::DatabaseError> for StoreError {
    fn from(err: common::error::DatabaseError) -> Self {
        if err.is_unique_violation() {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        common::error::DatabaseError::from(err).into()
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Errors surfaced by the HTTP layer.
///
/// Every variant renders as `{"error": "<message>"}`.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests")]
    TooManyRequests,

    /// The identity provider refused the exchange
    #[error("{0}")]
    UpstreamRejected(String),

    /// The identity provider could not be reached
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    /// Anything unexpected. The cause is logged, never returned.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AuthError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AuthError::Unauthorized(msg.into())
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        AuthError::Internal(cause.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) | AuthError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AuthError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AuthError::Internal(cause) => {
                error!("Internal error: {}", cause);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
