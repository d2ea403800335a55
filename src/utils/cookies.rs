use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};

use crate::models::errors::AppError;

/// Name of the cookie carrying the session token
pub const TOKEN_COOKIE_NAME: &str = "token";

/// Reads a cookie value from the request headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a session token valid for `expire_days`
pub fn session_cookie(token: &str, expire_days: i64) -> Result<HeaderValue, AppError> {
    let expires = Utc::now() + Duration::days(expire_days);
    let max_age = expire_days * 24 * 60 * 60;
    build_cookie(token, expires, max_age)
}

/// `Set-Cookie` value that clears the session token immediately
pub fn cleared_cookie() -> Result<HeaderValue, AppError> {
    build_cookie("", Utc::now(), 0)
}

fn build_cookie(value: &str, expires: DateTime<Utc>, max_age: i64) -> Result<HeaderValue, AppError> {
    let cookie = format!(
        "{}={}; Path=/; Expires={}; Max-Age={}; HttpOnly; Secure; SameSite=None",
        TOKEN_COOKIE_NAME,
        value,
        expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        max_age
    );

    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::internal_error(format!("Invalid cookie value: {}", e)))
}
