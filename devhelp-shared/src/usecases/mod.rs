/// Application use cases
///
/// Each operation takes the shared [`Services`] plus an already validated
/// request, runs its guard checks in a fixed order, and returns a DTO ready
/// to be wrapped in the HTTP envelope. Failures are [`AppError`]s.
///
/// # Modules
///
/// - [`auth`]: Signup, login, refresh, forgot/reset password
/// - [`invite`]: Send, verify and accept invitations
/// - [`company`]: Company user listing and status changes
/// - [`super_admin`]: Platform operator login and company management
/// - [`seed`]: Startup super-admin provisioning
///
/// # Example
///
/// ```no_run
/// use devhelp_shared::usecases::{auth, Services};
/// use devhelp_shared::usecases::auth::LoginRequest;
///
/// # async fn example(services: &Services) -> Result<(), devhelp_shared::error::AppError> {
/// let grant = auth::login(services, LoginRequest {
///     email: "jane@acme.io".to_string(),
///     password: "Str0ng!Pass".to_string(),
///     remember_me: false,
/// }).await?;
/// println!("{}", grant.payload.redirect_to);
/// # Ok(())
/// # }
/// ```

pub mod auth;
pub mod company;
pub mod invite;
pub mod seed;
pub mod super_admin;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;
use uuid::Uuid;
use validator::ValidationError;

use crate::auth::authorization::{Permissions, PlatformPermissions};
use crate::auth::jwt::TokenService;
use crate::auth::one_time_token;
use crate::auth::password::PasswordService;
use crate::mail::{EmailMessage, EmailService};
use crate::models::company::Company;
use crate::models::user::{User, UserRole, UserStatus};
use crate::store::Database;

/// Settings the use cases read besides their collaborators
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL for links in emails and redirects, without trailing slash
    pub frontend_url: String,

    /// Refresh cookie lifetime for a normal login
    pub refresh_ttl: Duration,

    /// Refresh cookie lifetime for a "remember me" login
    pub remember_me_ttl: Duration,
}

impl Settings {
    pub fn link(&self, path: &str) -> String {
        format!("{}{}", self.frontend_url.trim_end_matches('/'), path)
    }
}

/// Everything a use case needs, built once at startup
#[derive(Clone)]
pub struct Services {
    pub db: Arc<dyn Database>,
    pub tokens: TokenService,
    pub passwords: PasswordService,
    pub mailer: Arc<dyn EmailService>,
    pub settings: Settings,
}

impl Services {
    /// Sends a message, logging instead of failing
    pub(crate) async fn deliver(&self, kind: &'static str, message: EmailMessage) {
        let to = message.to.clone();
        if let Err(e) = self.mailer.send(message).await {
            error!(error = %e, email = %to, kind, "Failed to send email");
        }
    }
}

/// `{id, name}` reference to a company
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Company> for CompanyRef {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id,
            name: company.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PermissionSet {
    Company(Permissions),
    Platform(PlatformPermissions),
}

/// The signed-in user as returned to the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: UserStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyRef>,

    pub permissions: PermissionSet,
}

/// Body of a successful signup, login or invite acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: AuthUser,

    /// Access token
    pub token: String,

    pub expires_at: DateTime<Utc>,
    pub redirect_to: String,
}

/// An authenticated session: the response body plus the refresh token,
/// which only ever travels in a cookie
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub message: String,
    pub payload: AuthPayload,
    pub refresh_token: String,
    pub refresh_max_age: Duration,
}

/// Pagination block shared by list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: i64,
    pub total_items: i64,
    pub items_per_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageInfo {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let limit_i = i64::from(limit.max(1));
        let total_pages = (total + limit_i - 1) / limit_i;
        Self {
            current_page: page,
            total_pages,
            total_items: total,
            items_per_page: limit,
            has_next_page: i64::from(page) < total_pages,
            has_prev_page: page > 1,
        }
    }
}

pub(crate) fn auth_payload(
    services: &Services,
    user: &User,
    company: Option<&Company>,
    access_token: String,
    permissions: PermissionSet,
    redirect_to: String,
) -> AuthPayload {
    AuthPayload {
        user: AuthUser {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            status: user.status,
            company: company.map(CompanyRef::from),
            permissions,
        },
        token: access_token,
        expires_at: Utc::now() + services.tokens.access_ttl(),
        redirect_to,
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Serde helpers that normalize request fields before validation
pub mod de {
    use super::*;

    pub fn trimmed<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(String::deserialize(d)?.trim().to_string())
    }

    pub fn lower_trimmed<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(normalize_email(&String::deserialize(d)?))
    }

    /// Missing, blank or whitespace-only strings become None
    pub fn non_blank<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(d)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    /// Parses an enum from a query string, treating "" as absent
    pub fn blank_as_none<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match Option::<String>::deserialize(d)? {
            Some(s) if !s.trim().is_empty() => s
                .trim()
                .parse()
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Validator helpers shared by the request types
pub mod rules {
    use super::*;
    use std::borrow::Cow;

    fn with_message(code: &'static str, message: &'static str) -> ValidationError {
        let mut err = ValidationError::new(code);
        err.message = Some(Cow::Borrowed(message));
        err
    }

    pub fn agreed_to_terms(value: &bool) -> Result<(), ValidationError> {
        if *value {
            Ok(())
        } else {
            Err(with_message(
                "terms",
                "You must agree to the terms and conditions",
            ))
        }
    }

    pub fn reset_token(value: &str) -> Result<(), ValidationError> {
        if one_time_token::is_uuid_v4(value) {
            Ok(())
        } else {
            Err(with_message("token_format", "Invalid token format"))
        }
    }

    pub fn invitation_token(value: &str) -> Result<(), ValidationError> {
        if one_time_token::is_uuid_v4(value) {
            Ok(())
        } else {
            Err(with_message("token_format", "Invalid invitation token format"))
        }
    }
}
