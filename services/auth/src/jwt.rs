//! JWT signing and decoding
//!
//! Access tokens and app tokens are self-contained JWTs signed either with
//! RS256 (PEM key pair) or HS256 (shared secret). Decoding here checks the
//! signature and issuer only; expiry is a separate predicate owned by the
//! token manager.

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key material used to sign tokens
#[derive(Debug, Clone)]
pub enum JwtKeys {
    /// RS256 with PEM-encoded keys
    Rsa {
        private_key: String,
        public_key: String,
    },
    /// HS256 with a shared secret
    Secret(String),
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub keys: JwtKeys,
    /// Value of the `iss` claim, required on decode
    pub issuer: String,
    /// Access token expiration time in seconds (default: 30 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY` / `JWT_PUBLIC_KEY`: PEM text or path to a PEM file (RS256)
    /// - `JWT_SECRET`: shared secret, used when no key pair is configured (HS256)
    /// - `JWT_ISSUER`: issuer claim (default: "community-auth")
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 1800)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let keys = match (
            std::env::var("JWT_PRIVATE_KEY").ok(),
            std::env::var("JWT_PUBLIC_KEY").ok(),
        ) {
            (Some(private_key), Some(public_key)) => JwtKeys::Rsa {
                private_key: read_pem(&private_key)?,
                public_key: read_pem(&public_key)?,
            },
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("JWT_PRIVATE_KEY and JWT_PUBLIC_KEY must be set together")
            }
            (None, None) => {
                let secret = std::env::var("JWT_SECRET").map_err(|_| {
                    anyhow::anyhow!("either JWT_PRIVATE_KEY/JWT_PUBLIC_KEY or JWT_SECRET must be set")
                })?;
                JwtKeys::Secret(secret)
            }
        };

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "community-auth".to_string());

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "1800".to_string()) // 30 minutes
            .parse()
            .unwrap_or(1800);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "604800".to_string()) // 7 days
            .parse()
            .unwrap_or(604800);

        Ok(JwtConfig {
            keys,
            issuer,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

// A value that does not look like PEM is a path; try CWD, then the crate root.
fn read_pem(value: &str) -> Result<String> {
    if value.starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    std::fs::read_to_string(value)
        .or_else(|_| {
            let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            path.push(value);
            std::fs::read_to_string(path)
        })
        .map(|pem| pem.trim().to_string())
        .map_err(|e| anyhow::anyhow!("Failed to read key file {}: {}", value, e))
}

/// Kind of credential a token represents
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Browser session bearer token
    Access,
    /// Token scoped to a named downstream application
    App,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Username
    pub sub: String,
    /// Identity provider user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Downstream application name (app tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    pub iss: String,
    /// Issued at time
    pub iat: i64,
    /// Expiration time; absent on non-expiring app tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Token id, the handle used by the revocation list
    pub jti: String,
    pub token_type: TokenType,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let (encoding_key, decoding_key, algorithm) = match &config.keys {
            JwtKeys::Rsa {
                private_key,
                public_key,
            } => (
                EncodingKey::from_rsa_pem(private_key.as_bytes())?,
                DecodingKey::from_rsa_pem(public_key.as_bytes())?,
                Algorithm::RS256,
            ),
            JwtKeys::Secret(secret) => {
                if secret.is_empty() {
                    anyhow::bail!("JWT secret must not be empty");
                }
                (
                    EncodingKey::from_secret(secret.as_bytes()),
                    DecodingKey::from_secret(secret.as_bytes()),
                    Algorithm::HS256,
                )
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["iss"]);
        validation.set_issuer(&[config.issuer.as_str()]);

        Ok(JwtService {
            encoding_key,
            decoding_key,
            algorithm,
            validation,
            config,
        })
    }

    /// Build and sign access-token claims for a subject
    pub fn issue_access_token(
        &self,
        username: &str,
        external_id: &str,
        ttl: Duration,
    ) -> Result<(String, Claims)> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            external_id: Some(external_id.to_string()),
            app: None,
            iss: self.config.issuer.clone(),
            iat: now,
            exp: Some(now + ttl.num_seconds()),
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
        };

        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Build and sign an app token; `ttl = None` never expires
    pub fn issue_app_token(
        &self,
        username: &str,
        app_name: &str,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            external_id: None,
            app: Some(app_name.to_string()),
            iss: self.config.issuer.clone(),
            iat: now,
            exp: ttl.map(|ttl| now + ttl.num_seconds()),
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::App,
        };

        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let token = encode(&Header::new(self.algorithm), claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify signature and issuer and return the claims. Expiry is not checked.
    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Get the access token expiry time in seconds
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the refresh token expiry time in seconds
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    pub(crate) fn secret_config() -> JwtConfig {
        JwtConfig {
            keys: JwtKeys::Secret("unit-test-signing-secret".to_string()),
            issuer: "community-auth".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
        }
    }

    #[test]
    fn access_token_carries_subject() {
        let service = JwtService::new(secret_config()).unwrap();
        let (token, issued) = service
            .issue_access_token("ada", "1234", Duration::minutes(30))
            .unwrap();

        let claims = service.decode(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.sub, "ada");
        assert_eq!(claims.external_id.as_deref(), Some("1234"));
        assert_eq!(claims.exp, Some(claims.iat + 1800));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn expired_token_still_decodes() {
        let service = JwtService::new(secret_config()).unwrap();
        let (token, _) = service
            .issue_access_token("ada", "1234", Duration::minutes(-5))
            .unwrap();

        assert!(service.decode(&token).is_ok());
    }

    #[test]
    fn app_token_without_ttl_has_no_exp() {
        let service = JwtService::new(secret_config()).unwrap();
        let token = service.issue_app_token("ada", "scoreboard", None).unwrap();

        let claims = service.decode(&token).unwrap();
        assert_eq!(claims.exp, None);
        assert_eq!(claims.app.as_deref(), Some("scoreboard"));
        assert_eq!(claims.token_type, TokenType::App);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let service = JwtService::new(secret_config()).unwrap();
        let mut other = secret_config();
        other.keys = JwtKeys::Secret("some-other-secret".to_string());
        let other = JwtService::new(other).unwrap();

        let (token, _) = other
            .issue_access_token("ada", "1234", Duration::minutes(30))
            .unwrap();
        let err = service.decode(&token).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidSignature);
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let service = JwtService::new(secret_config()).unwrap();
        let mut other = secret_config();
        other.issuer = "someone-else".to_string();
        let other = JwtService::new(other).unwrap();

        let (token, _) = other
            .issue_access_token("ada", "1234", Duration::minutes(30))
            .unwrap();
        let err = service.decode(&token).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidIssuer);
    }

    #[test]
    fn rsa_key_pair_round_trip() {
        let config = JwtConfig {
            keys: JwtKeys::Rsa {
                private_key: include_str!("../tests/fixtures/test_private.pem").to_string(),
                public_key: include_str!("../tests/fixtures/test_public.pem").to_string(),
            },
            ..secret_config()
        };
        let service = JwtService::new(config).unwrap();

        let (token, _) = service
            .issue_access_token("ada", "1234", Duration::minutes(30))
            .unwrap();
        assert_eq!(service.decode(&token).unwrap().sub, "ada");
    }

    #[test]
    fn garbage_is_rejected() {
        let service = JwtService::new(secret_config()).unwrap();
        assert!(service.decode("not-a-jwt").is_err());
    }
}
