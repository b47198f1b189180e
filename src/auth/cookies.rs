use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

use crate::config::CookieConfig;

pub const SESSION_COOKIE_NAME: &str = "session_data";
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";
const OAUTH_STATE_TTL_SECONDS: u64 = 600;

/// `Set-Cookie` value for the session payload.
pub fn session_cookie(
    cfg: &CookieConfig,
    value: &str,
    ttl_seconds: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}={value}; Path=/; SameSite=Lax; Max-Age={ttl_seconds}");
    if cfg.http_only {
        cookie.push_str("; HttpOnly");
    }
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(cfg: &CookieConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    session_cookie(cfg, "", 0)
}

/// Short-lived CSRF state for the OAuth round trip. Always HttpOnly.
pub fn oauth_state_cookie(
    cfg: &CookieConfig,
    state: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{OAUTH_STATE_COOKIE_NAME}={state}; Path=/api/login; HttpOnly; SameSite=Lax; Max-Age={OAUTH_STATE_TTL_SECONDS}"
    );
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_oauth_state_cookie() -> HeaderValue {
    HeaderValue::from_static("oauth_state=; Path=/api/login; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
