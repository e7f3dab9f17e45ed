#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use auth::{
    AppState, Backends,
    config::AuthConfig,
    create_router,
    domain::with_query_params,
    jwt::{JwtConfig, JwtKeys, JwtService},
    models::Organization,
    oauth::{ExternalProfile, IdentityProvider, ProviderError},
    repositories::{
        MemoryOrganizationRepository, MemoryPartnerRepository, MemoryTokenStore,
        StaticGuildDirectory,
    },
};

pub const AUTHORIZE_URL: &str = "https://provider.test/oauth2/authorize";

/// Identity provider that accepts every code and returns a fixed profile
pub struct StubProvider {
    profile: Mutex<ExternalProfile>,
}

impl StubProvider {
    pub fn sign_in_as(&self, id: &str, username: &str) {
        if let Ok(mut profile) = self.profile.lock() {
            *profile = ExternalProfile {
                id: id.to_string(),
                username: username.to_string(),
            };
        }
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn authorize_url(&self, state: &str) -> String {
        with_query_params(AUTHORIZE_URL, &[("state", state.to_string())])
            .unwrap_or_else(|_| AUTHORIZE_URL.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        if code == "bad" {
            return Err(ProviderError::Rejected("invalid_grant".to_string()));
        }
        Ok(format!("provider-token-{code}"))
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ExternalProfile, ProviderError> {
        self.profile
            .lock()
            .map(|profile| profile.clone())
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<StubProvider>,
    pub organizations: MemoryOrganizationRepository,
    pub partners: MemoryPartnerRepository,
    pub guilds: StaticGuildDirectory,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AuthConfig::for_tests()).await
    }

    pub async fn with_config(config: AuthConfig) -> Self {
        let provider = Arc::new(StubProvider {
            profile: Mutex::new(ExternalProfile {
                id: "555".to_string(),
                username: "ada".to_string(),
            }),
        });
        let organizations = MemoryOrganizationRepository::new();
        organizations.insert(acme()).await;
        let partners = MemoryPartnerRepository::new();
        let guilds = StaticGuildDirectory::new();
        guilds.govern("g-acme").await;

        let jwt = JwtService::new(JwtConfig {
            keys: JwtKeys::Secret("integration-test-signing-secret".to_string()),
            issuer: "community-auth".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
        })
        .expect("jwt service");

        let state = AppState::new(
            config,
            jwt,
            Backends {
                provider: provider.clone(),
                organizations: Arc::new(organizations.clone()),
                partners: Arc::new(partners.clone()),
                guilds: Arc::new(guilds.clone()),
                token_store: Arc::new(MemoryTokenStore::new()),
            },
        );

        Self {
            router: create_router(state.clone()),
            state,
            provider,
            organizations,
            partners,
            guilds,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn get(&self, uri: &str) -> Result<Response> {
        self.send(Request::builder().uri(uri).body(Body::empty())?)
            .await
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> Result<Response> {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, bearer: Option<&str>, body: Value) -> Result<Response> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::from(body.to_string()))?).await
    }

    pub async fn put_json(&self, uri: &str, bearer: &str, body: Value) -> Result<Response> {
        self.send(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
                .body(Body::from(body.to_string()))?,
        )
        .await
    }

    /// Run the officer login flow end to end and return the redirect target
    pub async fn officer_login(&self) -> Result<Response> {
        let login = self.get("/login").await?;
        let state = query_of(&location(&login))["state"].clone();
        self.get(&format!("/callback?code=abc&state={state}")).await
    }
}

/// Organization `acme`, ready for partner logins from acme.com
pub fn acme() -> Organization {
    Organization {
        id: 1,
        name: "Acme".to_string(),
        prefix: "acme".to_string(),
        guild_id: "g-acme".to_string(),
        is_active: true,
        storefront_enabled: true,
        oauth_enabled: true,
        oauth_callback_url: Some("https://acme.com/done".to_string()),
        allowed_domains: vec!["acme.com".to_string()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn read_json(response: Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn query_of(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}
