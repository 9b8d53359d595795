/// The httpOnly `refreshToken` cookie
///
/// The refresh token never appears in a response body. It is set as
/// `HttpOnly; SameSite=Strict; Path=/` with a `Max-Age`, plus `Secure`
/// in production.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Duration;

use crate::error::ApiError;
use devhelp_shared::error::AppError;

pub const REFRESH_COOKIE: &str = "refreshToken";

fn render(value: &str, max_age_secs: i64, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={value}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError(AppError::internal(format!("invalid cookie value: {e}"))))
}

/// `Set-Cookie` value carrying a refresh token
pub fn refresh_cookie(token: &str, max_age: Duration, secure: bool) -> Result<HeaderValue, ApiError> {
    render(token, max_age.num_seconds().max(0), secure)
}

/// `Set-Cookie` value that deletes the refresh cookie
pub fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, ApiError> {
    render("", 0, secure)
}

/// Value of the named cookie from the `Cookie` request headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
