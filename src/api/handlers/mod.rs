//! HTTP handlers and request helpers.

pub mod events;
pub mod flow;
pub mod health;

use axum::http::{HeaderMap, header::COOKIE, header::USER_AGENT};
use std::collections::HashMap;

/// Header a fronting identity server uses to pass its client's User-Agent.
pub const FORWARDED_USER_AGENT: &str = "x-forwarded-user-agent";

/// Client address from `x-forwarded-for` (first hop) or `x-real-ip`.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The end user's User-Agent. A forwarded value wins over the caller's own.
#[must_use]
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    [FORWARDED_USER_AGENT, USER_AGENT.as_str()]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// All request cookies. Later duplicates do not replace earlier ones.
#[must_use]
pub fn extract_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            cookies
                .entry(key.to_string())
                .or_insert_with(|| val.trim().to_string());
        }
    }
    cookies
}
