/// Application errors
///
/// Every failure a use case can report is a variant here. Each one maps to a
/// fixed HTTP status and a stable machine-readable code that clients switch
/// on; the message is human-readable and may vary per call site.
///
/// # Example
///
/// ```
/// use devhelp_shared::error::AppError;
/// use axum::http::StatusCode;
///
/// let err = AppError::InviteExpired("This invitation has expired.".into());
/// assert_eq!(err.status(), StatusCode::GONE);
/// assert_eq!(err.code(), "INVITE_EXPIRED");
/// ```

use std::collections::BTreeMap;

use axum::http::StatusCode;
use tracing::error;

use crate::auth::password::PasswordError;
use crate::mail::MailError;
use crate::store::StoreError;

/// Field name (camelCase) to first validation message
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, fields: FieldErrors },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    TokenExpired(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    TokenAlreadyUsed(String),

    #[error("{0}")]
    PasswordReuse(String),

    #[error("{0}")]
    NoRefreshToken(String),

    #[error("{0}")]
    UserNotFound(String),

    #[error("{0}")]
    UserInactive(String),

    #[error("{0}")]
    UserInvited(String),

    #[error("{0}")]
    EmailAlreadyExists(String),

    #[error("{0}")]
    CompanyNotFound(String),

    #[error("{0}")]
    CompanyInactive(String),

    #[error("{0}")]
    CompanySuspended(String),

    #[error("{0}")]
    InvalidCompanyId(String),

    #[error("{0}")]
    InvalidInviteToken(String),

    #[error("{0}")]
    InvalidTokenFormat(String),

    #[error("{0}")]
    InvitationAlreadyAccepted(String),

    #[error("{0}")]
    InviteCancelled(String),

    #[error("{0}")]
    InviteExpired(String),

    #[error("{0}")]
    InviteAlreadyExists(String),

    #[error("{0}")]
    InviteAlreadySent(String),

    #[error("{0}")]
    InviteNotFound(String),

    #[error("{0}")]
    InvalidInviteStatus(String),

    #[error("{0}")]
    CannotInviteSelf(String),

    #[error("{0}")]
    InvalidSuperAdminCredentials(String),

    #[error("{0}")]
    UnauthorizedSuperAdmin(String),

    /// Rate limit hit; `retry_after_secs` feeds the Retry-After header
    #[error("{message}")]
    TooManyRequests {
        message: String,
        retry_after_secs: u64,
    },

    /// Unique constraint hit that no use case translated
    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    RouteNotFound(String),

    /// Unexpected failure; the detail is logged, never shown in production
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            Validation { .. }
            | InvalidToken(_)
            | TokenAlreadyUsed(_)
            | PasswordReuse(_)
            | EmailAlreadyExists(_)
            | InvalidCompanyId(_)
            | InvalidTokenFormat(_)
            | InvitationAlreadyAccepted(_)
            | InviteAlreadyExists(_)
            | InviteAlreadySent(_)
            | InvalidInviteStatus(_)
            | CannotInviteSelf(_)
            | DuplicateKey(_) => StatusCode::BAD_REQUEST,

            Unauthorized(_)
            | InvalidCredentials(_)
            | TokenExpired(_)
            | NoRefreshToken(_)
            | InvalidSuperAdminCredentials(_) => StatusCode::UNAUTHORIZED,

            Forbidden(_)
            | UserInactive(_)
            | UserInvited(_)
            | CompanyInactive(_)
            | CompanySuspended(_)
            | UnauthorizedSuperAdmin(_) => StatusCode::FORBIDDEN,

            UserNotFound(_)
            | CompanyNotFound(_)
            | InvalidInviteToken(_)
            | InviteNotFound(_)
            | RouteNotFound(_) => StatusCode::NOT_FOUND,

            InviteCancelled(_) | InviteExpired(_) => StatusCode::GONE,

            TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,

            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        use AppError::*;
        match self {
            Validation { .. } => "VALIDATION_ERROR",
            Forbidden(_) => "FORBIDDEN",
            Unauthorized(_) => "UNAUTHORIZED",
            InvalidCredentials(_) => "INVALID_CREDENTIALS",
            TokenExpired(_) => "TOKEN_EXPIRED",
            InvalidToken(_) => "INVALID_TOKEN",
            TokenAlreadyUsed(_) => "TOKEN_ALREADY_USED",
            PasswordReuse(_) => "PASSWORD_REUSED",
            NoRefreshToken(_) => "NO_REFRESH_TOKEN",
            UserNotFound(_) => "USER_NOT_FOUND",
            UserInactive(_) => "USER_INACTIVE",
            UserInvited(_) => "USER_INVITED",
            EmailAlreadyExists(_) => "EMAIL_EXISTS",
            CompanyNotFound(_) => "COMPANY_NOT_FOUND",
            CompanyInactive(_) => "COMPANY_INACTIVE",
            CompanySuspended(_) => "COMPANY_SUSPENDED",
            InvalidCompanyId(_) => "INVALID_COMPANY_ID",
            InvalidInviteToken(_) => "INVALID_INVITE_TOKEN",
            InvalidTokenFormat(_) => "INVALID_TOKEN_FORMAT",
            InvitationAlreadyAccepted(_) => "INVITATION_ALREADY_ACCEPTED",
            InviteCancelled(_) => "INVITE_CANCELLED",
            InviteExpired(_) => "INVITE_EXPIRED",
            InviteAlreadyExists(_) => "INVITE_EXISTS",
            InviteAlreadySent(_) => "INVITE_ALREADY_SENT",
            InviteNotFound(_) => "INVITE_NOT_FOUND",
            InvalidInviteStatus(_) => "INVALID_INVITE_STATUS",
            CannotInviteSelf(_) => "CANNOT_INVITE_SELF",
            InvalidSuperAdminCredentials(_) => "INVALID_SUPER_ADMIN_CREDENTIALS",
            UnauthorizedSuperAdmin(_) => "UNAUTHORIZED_SUPER_ADMIN",
            TooManyRequests { .. } => "MANY_REQUESTS",
            DuplicateKey(_) => "DUPLICATE_KEY",
            RouteNotFound(_) => "NOT_FOUND",
            Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message safe to send to clients
    ///
    /// Internal errors collapse to a generic message; pass
    /// `expose_internal = true` only in development.
    pub fn public_message(&self, expose_internal: bool) -> String {
        match self {
            AppError::Internal(detail) if expose_internal => detail.clone(),
            AppError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Internal(_))
    }

    pub fn validation(fields: FieldErrors) -> Self {
        AppError::Validation {
            message: "Validation failed".to_string(),
            fields,
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), message.to_string());
        Self::validation(fields)
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        AppError::Internal(detail.to_string())
    }

    // Default messages, for call sites with nothing more specific to say

    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials("invalid credentials".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Forbidden".to_string())
    }

    pub fn unauthorized() -> Self {
        AppError::Unauthorized("not authorized to go here".to_string())
    }

    pub fn user_not_found() -> Self {
        AppError::UserNotFound("User not found".to_string())
    }

    pub fn company_not_found() -> Self {
        AppError::CompanyNotFound("Company not found".to_string())
    }

    pub fn route_not_found() -> Self {
        AppError::RouteNotFound("Route not found".to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                tracing::warn!(constraint = %constraint, "Unhandled unique constraint violation");
                AppError::DuplicateKey("Resource already exists".to_string())
            }
            other => {
                error!(error = %other, "Storage failure");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        error!(error = %err, "Password hashing failure");
        AppError::Internal(err.to_string())
    }
}

impl From<crate::auth::jwt::JwtError> for AppError {
    /// Only token *creation* reaches this conversion; verification failures
    /// are mapped explicitly at each call site.
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        error!(error = %err, "Token failure");
        AppError::Internal(err.to_string())
    }
}

impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
