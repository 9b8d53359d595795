/// Request authentication context
///
/// The HTTP layer parses the `Authorization: Bearer <token>` header with
/// [`authenticate_bearer`] and stores the resulting [`AuthContext`] in the
/// request extensions for handlers and role guards to read.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{Claims, JwtError, TokenService};
use crate::error::{AppError, AppResult};
use crate::models::user::UserRole;

/// Identity of the caller, taken from a verified access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,

    /// None for super admins
    pub company_id: Option<Uuid>,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            company_id: claims.company_id,
        }
    }
}

/// Verifies an `Authorization` header value and builds the caller's context
///
/// # Errors
///
/// - `UNAUTHORIZED` "No authorization header" when the header is absent
/// - `UNAUTHORIZED` "Invalid authorization format" for a non-Bearer scheme or empty token
/// - `TOKEN_EXPIRED` when the access token is past its expiry
/// - `UNAUTHORIZED` "Invalid token" for anything else, including refresh tokens
pub fn authenticate_bearer(header: Option<&str>, tokens: &TokenService) -> AppResult<AuthContext> {
    let header =
        header.ok_or_else(|| AppError::Unauthorized("No authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;

    let claims = tokens.verify_access_token(token).map_err(|e| match e {
        JwtError::Expired => AppError::TokenExpired("Token has expired. Please refresh.".to_string()),
        other => {
            tracing::debug!(error = %other, "Rejected access token");
            AppError::Unauthorized("Invalid token".to_string())
        }
    })?;

    Ok(claims.into())
}
