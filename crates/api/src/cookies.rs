//! Auth cookie handling.
//!
//! Both credentials are mirrored into `HttpOnly; SameSite=Strict` cookies so
//! browser clients never touch them from script. `Secure` is added when the
//! deployment is production.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use warden_core::credential::IssuedCredential;
use warden_core::session::TokenPair;

use crate::error::{AppError, AppResult};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Find cookie `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn cookie_header(name: &str, value: &str, max_age: i64, secure: bool) -> AppResult<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    let cookie =
        format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Strict{secure}");
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::InternalError(format!("Invalid cookie value: {e}")))
}

fn credential_cookie(name: &str, credential: &IssuedCredential, secure: bool) -> AppResult<HeaderValue> {
    let max_age = (credential.expires_at - credential.issued_at)
        .num_seconds()
        .max(0);
    cookie_header(name, &credential.token, max_age, secure)
}

/// `Set-Cookie` headers carrying a freshly issued pair.
pub fn set_auth_cookies(tokens: &TokenPair, secure: bool) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, credential_cookie(ACCESS_COOKIE, &tokens.access, secure)?);
    headers.append(SET_COOKIE, credential_cookie(REFRESH_COOKIE, &tokens.refresh, secure)?);
    Ok(headers)
}

/// `Set-Cookie` headers expiring both auth cookies.
pub fn clear_auth_cookies(secure: bool) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, cookie_header(ACCESS_COOKIE, "", 0, secure)?);
    headers.append(SET_COOKIE, cookie_header(REFRESH_COOKIE, "", 0, secure)?);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn credential(token: &str, ttl: Duration) -> IssuedCredential {
        let issued_at = Utc::now();
        IssuedCredential {
            token: token.to_string(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    #[test]
    fn reads_named_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; accessToken=abc.def"));
        headers.append(COOKIE, HeaderValue::from_static("refreshToken=xyz"));

        assert_eq!(read_cookie(&headers, ACCESS_COOKIE), Some("abc.def"));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE), Some("xyz"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("accessToken="));
        assert_eq!(read_cookie(&headers, ACCESS_COOKIE), None);
    }

    #[test]
    fn auth_cookies_carry_lifetime_and_flags() {
        let tokens = TokenPair {
            access: credential("access-token", Duration::minutes(15)),
            refresh: credential("refresh-token", Duration::days(7)),
        };
        let headers = set_auth_cookies(&tokens, true).unwrap();
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("accessToken=access-token; Max-Age=900;"));
        assert!(values[1].starts_with("refreshToken=refresh-token; Max-Age=604800;"));
        assert!(values.iter().all(|v| v.contains("HttpOnly")
            && v.contains("SameSite=Strict")
            && v.ends_with("; Secure")));
    }

    #[test]
    fn clearing_expires_both_cookies() {
        let headers = clear_auth_cookies(false).unwrap();
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.contains("Max-Age=0") && !v.contains("Secure")));
    }
}
