//! Origin domain extraction and allow-list matching

use axum::http::HeaderMap;
use url::Url;

/// Extract the normalized domain of a URL: host only, no port, no leading
/// `www.`, lower case. `None` when the input has no scheme or host.
pub fn extract_domain(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }

    let host = host.to_ascii_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host);
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

/// Exact or subdomain match against an organization's allow-list.
///
/// Fails closed on empty input.
pub fn is_domain_authorized(origin: &str, allowed: &[String]) -> bool {
    let origin = origin.trim().to_ascii_lowercase();
    if origin.is_empty() {
        return false;
    }

    allowed.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        !entry.is_empty()
            && (origin == entry
                || origin
                    .strip_suffix(entry.as_str())
                    .is_some_and(|head| head.ends_with('.')))
    })
}

/// Infer the calling domain from request headers.
///
/// Precedence: `Origin`, `Referer`, `X-Forwarded-Host`, `Host`. The first
/// header that is present and parses wins.
pub fn extract_origin(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("origin")
        .and_then(extract_domain)
        .or_else(|| header("referer").and_then(extract_domain))
        .or_else(|| {
            header("x-forwarded-host")
                .and_then(|host| host.split(',').next())
                .and_then(|host| extract_domain(&format!("https://{}", host.trim())))
        })
        .or_else(|| header("host").and_then(|host| extract_domain(&format!("https://{host}"))))
}

/// Set query parameters on a URL, keeping the parameters it already has.
/// A key that already exists is replaced.
pub fn with_query_params(base: &str, params: &[(&str, String)]) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| name == key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}
