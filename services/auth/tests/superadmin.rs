mod support;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

use support::{TestApp, read_json};

async fn superadmin_token(app: &TestApp) -> Result<String> {
    Ok(app.state.tokens.issue_session_pair("root", "1000").await?.access_token)
}

#[tokio::test]
async fn management_requires_superadmin() -> Result<()> {
    let app = TestApp::new().await;

    let response = app.get("/superadmin/organizations/1/oauth").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let officer = app.state.tokens.issue_session_pair("ada", "555").await?;
    let response = app
        .get_with_bearer("/superadmin/organizations/1/oauth", &officer.access_token)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        read_json(response).await?,
        json!({"error": "Superadmin access required"})
    );

    Ok(())
}

#[tokio::test]
async fn superadmin_reads_and_replaces_settings() -> Result<()> {
    let app = TestApp::new().await;
    let token = superadmin_token(&app).await?;

    let response = app
        .get_with_bearer("/superadmin/organizations/1/oauth", &token)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["oauth_enabled"], true);
    assert_eq!(body["oauth_callback_url"], "https://acme.com/done");
    assert_eq!(body["allowed_domains"], json!(["acme.com"]));

    let response = app
        .put_json(
            "/superadmin/organizations/1/oauth",
            &token,
            json!({
                "oauth_enabled": false,
                "oauth_callback_url": "https://acme.com/welcome",
                "allowed_domains": [" Acme.com ", "acme.com", "not a domain", "shop.acme.io"],
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["organization"]["oauth_enabled"], false);
    assert_eq!(
        body["organization"]["allowed_domains"],
        json!(["acme.com", "shop.acme.io"])
    );

    let response = app
        .put_json(
            "/superadmin/organizations/1/oauth",
            &token,
            json!({"oauth_callback_url": "https://acme.com"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn superadmin_updates_domains_and_callback() -> Result<()> {
    let app = TestApp::new().await;
    let token = superadmin_token(&app).await?;

    let response = app
        .put_json(
            "/superadmin/organizations/1/domains",
            &token,
            json!({"allowed_domains": ["partner.example", "ACME.com"]}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await?["allowed_domains"],
        json!(["partner.example", "acme.com"])
    );

    let response = app
        .put_json(
            "/superadmin/organizations/1/domains",
            &token,
            json!({"allowed_domains": "acme.com"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put_json(
            "/superadmin/organizations/1/callback",
            &token,
            json!({"oauth_callback_url": "ftp://acme.com/done"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = read_json(response).await?["error"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    assert!(error.starts_with("Invalid callback URL"));

    let response = app
        .put_json(
            "/superadmin/organizations/1/callback",
            &token,
            json!({"oauth_callback_url": "https://partner.example/auth"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await?["oauth_callback_url"],
        "https://partner.example/auth"
    );

    let response = app
        .put_json(
            "/superadmin/organizations/99/callback",
            &token,
            json!({"oauth_callback_url": "https://partner.example/auth"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        read_json(response).await?,
        json!({"error": "Organization not found"})
    );

    Ok(())
}

#[tokio::test]
async fn superadmin_tests_config_and_reads_summary() -> Result<()> {
    let app = TestApp::new().await;
    let token = superadmin_token(&app).await?;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/superadmin/organizations/1/oauth/test")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["organization"], "Acme");
    let report = &body["oauth_config"];
    assert_eq!(report["has_callback_url"], true);
    assert_eq!(report["callback_url_valid"], true);
    assert_eq!(report["domains_count"], 1);
    assert_eq!(report["all_domains_valid"], true);

    let response = app
        .get_with_bearer("/superadmin/organizations/oauth/summary", &token)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["total_organizations"], 1);
    assert_eq!(body["oauth_enabled_count"], 1);
    assert_eq!(body["oauth_configured_count"], 1);
    assert_eq!(body["organizations_details"][0]["prefix"], "acme");

    Ok(())
}
