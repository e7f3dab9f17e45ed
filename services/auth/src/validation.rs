//! Input validation for organization OAuth settings and token requests

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::domain::extract_domain;

fn domain_regex() -> &'static Regex {
    static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();
    DOMAIN_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("Failed to compile domain regex")
    })
}

/// Whether a string is a syntactically valid domain name
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty() && domain_regex().is_match(domain)
}

/// Validate a partner callback URL
pub fn validate_callback_url(callback_url: &str) -> Result<(), String> {
    if callback_url.is_empty() {
        return Err("Callback URL is required".to_string());
    }

    let parsed = Url::parse(callback_url)
        .map_err(|_| "Callback URL must include scheme (http:// or https://)".to_string())?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err("Callback URL must use HTTP or HTTPS scheme".to_string());
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err("Callback URL must include a valid domain".to_string());
    }

    let domain =
        extract_domain(callback_url).ok_or_else(|| "Invalid domain in callback URL".to_string())?;

    if !is_valid_domain(&domain) {
        return Err("Invalid domain format in callback URL".to_string());
    }

    Ok(())
}

/// Trim, lower-case and drop invalid entries from a domain list
pub fn sanitize_domain_list(domains: &[String]) -> Vec<String> {
    let mut sanitized: Vec<String> = Vec::new();
    for domain in domains {
        let domain = domain.trim().to_ascii_lowercase();
        if is_valid_domain(&domain) && !sanitized.contains(&domain) {
            sanitized.push(domain);
        }
    }
    sanitized
}

/// Validate the name of a downstream application requesting an app token
pub fn validate_app_name(app_name: &str) -> Result<(), String> {
    if app_name.trim().is_empty() {
        return Err("appname query parameter is required".to_string());
    }

    if app_name.len() > 64 {
        return Err("appname must be at most 64 characters long".to_string());
    }

    static APP_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = APP_NAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.\-]+$").expect("Failed to compile app name regex"));

    if !regex.is_match(app_name) {
        return Err(
            "appname can only contain letters, numbers, dots, dashes and underscores".to_string(),
        );
    }

    Ok(())
}
