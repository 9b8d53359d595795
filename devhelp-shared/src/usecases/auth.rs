/// Company signup and the password-based session lifecycle

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use super::rules::{agreed_to_terms, reset_token};
use super::{auth_payload, de, normalize_email, PermissionSet, Services, SessionGrant};
use crate::auth::authorization::{permissions_for, redirect_path};
use crate::auth::jwt::{JwtError, TokenSubject};
use crate::auth::one_time_token;
use crate::auth::password::validate_password_policy;
use crate::error::{AppError, AppResult};
use crate::mail::templates;
use crate::models::company::{CompanyStatus, NewCompany};
use crate::models::password_reset::{reset_lifetime, NewPasswordReset};
use crate::models::user::{NewUser, UserChanges, UserRole, UserStatus};
use crate::store::{constraints, StoreError};

pub const FORGOT_PASSWORD_MESSAGE: &str = "If an account exists with this email, you will receive password reset instructions. Please check your inbox.";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(deserialize_with = "de::trimmed")]
    #[validate(length(min = 2, max = 100, message = "Company name must be between 2 and 100 characters"))]
    pub company_name: String,

    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid company email address"))]
    pub company_email: String,

    #[serde(deserialize_with = "de::trimmed")]
    #[validate(length(min = 2, max = 100, message = "First Name must be between 2 and 100 characters"))]
    pub admin_first_name: String,

    #[serde(deserialize_with = "de::trimmed")]
    #[validate(length(min = 2, max = 100, message = "Last Name must be between 2 and 100 characters"))]
    pub admin_last_name: String,

    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid admin email address"))]
    pub admin_email: String,

    #[validate(
        length(min = 8, max = 120, message = "Password must be between 8 and 120 characters"),
        custom(function = "validate_password_policy")
    )]
    pub password: String,

    #[serde(default)]
    #[validate(custom(function = "agreed_to_terms"))]
    pub agree_to_terms: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(custom(function = "reset_token"))]
    pub token: String,

    #[validate(
        length(min = 8, max = 120, message = "Password must be between 8 and 120 characters"),
        custom(function = "validate_password_policy")
    )]
    pub new_password: String,

    #[validate(
        length(min = 1, message = "Please confirm your password"),
        must_match(other = "new_password", message = "Passwords don't match")
    )]
    pub confirm_password: String,
}

/// New access token handed out by [`refresh`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub message: &'static str,
    pub redirect_to: String,
}

fn signup_conflict(err: StoreError) -> AppError {
    match err.violated_constraint() {
        Some(constraints::COMPANIES_EMAIL) => {
            AppError::EmailAlreadyExists("Company email already registered".to_string())
        }
        Some(constraints::USERS_EMAIL) => {
            AppError::EmailAlreadyExists("Admin email already registered".to_string())
        }
        Some(_) => AppError::EmailAlreadyExists("Email already registered".to_string()),
        None => err.into(),
    }
}

/// Registers a company together with its first admin and signs the admin in
///
/// # Errors
///
/// - `EMAIL_EXISTS` when either email is already registered, including when
///   a concurrent signup wins the race
pub async fn signup(services: &Services, req: SignupRequest) -> AppResult<SessionGrant> {
    {
        let mut session = services.db.acquire().await?;
        if session.companies().find_by_email(&req.company_email).await?.is_some() {
            return Err(AppError::EmailAlreadyExists(
                "Company email already registered".to_string(),
            ));
        }
        if session.users().find_by_email(&req.admin_email).await?.is_some() {
            return Err(AppError::EmailAlreadyExists(
                "Admin email already registered".to_string(),
            ));
        }
    }

    let password_hash = services.passwords.hash(&req.password).await?;

    let mut session = services.db.begin().await?;

    let company = session
        .companies()
        .create(NewCompany {
            name: req.company_name,
            email: req.company_email,
            status: CompanyStatus::Active,
        })
        .await
        .map_err(signup_conflict)?;

    let user = session
        .users()
        .create(NewUser {
            first_name: req.admin_first_name,
            last_name: req.admin_last_name,
            email: req.admin_email,
            password_hash,
            role: UserRole::Admin,
            status: UserStatus::Active,
            company_id: Some(company.id),
        })
        .await
        .map_err(signup_conflict)?;

    session.commit().await.map_err(signup_conflict)?;

    info!(company_id = %company.id, user_id = %user.id, "Company signed up");

    let pair = services.tokens.generate_token_pair(&TokenSubject::from(&user))?;
    let payload = auth_payload(
        services,
        &user,
        Some(&company),
        pair.access_token,
        PermissionSet::Company(permissions_for(user.role)),
        redirect_path(user.role).to_string(),
    );

    Ok(SessionGrant {
        message: "Company created successfully".to_string(),
        payload,
        refresh_token: pair.refresh_token,
        refresh_max_age: services.settings.refresh_ttl,
    })
}

/// Signs in a company user
///
/// Company status is checked before user status, and both before the
/// password, so a wrong password always yields `INVALID_CREDENTIALS`.
pub async fn login(services: &Services, req: LoginRequest) -> AppResult<SessionGrant> {
    let email = normalize_email(&req.email);
    let mut session = services.db.acquire().await?;

    let user = session
        .users()
        .find_by_email(&email)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    let company_id = user.company_id.ok_or_else(AppError::invalid_credentials)?;

    let company = session
        .companies()
        .find_by_id(company_id)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    match company.status {
        CompanyStatus::Active | CompanyStatus::Trial => {}
        CompanyStatus::Inactive => {
            return Err(AppError::CompanyInactive(
                "This company account is inactive. Please contact admin.".to_string(),
            ))
        }
        CompanyStatus::Suspended => {
            return Err(AppError::CompanySuspended(
                "The company account is currently suspended. Please contact support for assistance."
                    .to_string(),
            ))
        }
        CompanyStatus::Deleted => return Err(AppError::invalid_credentials()),
    }

    match user.status {
        UserStatus::Active => {}
        UserStatus::Invited => {
            return Err(AppError::UserInvited(
                "Please complete your account setup. Check your email for invitation link."
                    .to_string(),
            ))
        }
        UserStatus::Inactive => {
            return Err(AppError::UserInactive(
                "Your account is deactivated. Please contact your admin.".to_string(),
            ))
        }
        UserStatus::Blocked => {
            return Err(AppError::UserInactive(
                "Your account has been blocked. Please contact your admin.".to_string(),
            ))
        }
    }

    if !services.passwords.verify(&req.password, &user.password_hash).await? {
        warn!(email = %email, company_id = %company.id, "Login failed - invalid credentials");
        return Err(AppError::invalid_credentials());
    }

    let user = session
        .users()
        .update(
            user.id,
            UserChanges {
                last_login: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?
        .unwrap_or(user);

    info!(user_id = %user.id, company_id = %company.id, "Login successful");

    let pair = services.tokens.generate_token_pair(&TokenSubject::from(&user))?;
    let payload = auth_payload(
        services,
        &user,
        Some(&company),
        pair.access_token,
        PermissionSet::Company(permissions_for(user.role)),
        redirect_path(user.role).to_string(),
    );

    let refresh_max_age = if req.remember_me {
        services.settings.remember_me_ttl
    } else {
        services.settings.refresh_ttl
    };

    Ok(SessionGrant {
        message: "Login successful".to_string(),
        payload,
        refresh_token: pair.refresh_token,
        refresh_max_age,
    })
}

/// Exchanges the refresh cookie for a new access token
///
/// Claims are rebuilt from the current user row, so role changes take
/// effect on the next refresh.
pub async fn refresh(services: &Services, refresh_token: Option<&str>) -> AppResult<RefreshedToken> {
    let token = refresh_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::NoRefreshToken("Refresh token not found".to_string()))?;

    let claims = services.tokens.verify_refresh_token(token).map_err(|e| match e {
        JwtError::Expired => AppError::TokenExpired("Refresh token has expired".to_string()),
        other => {
            warn!(error = %other, "Rejected refresh token");
            AppError::Unauthorized("Invalid refresh token".to_string())
        }
    })?;

    let mut session = services.db.acquire().await?;
    let user = session
        .users()
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if user.status != UserStatus::Active {
        return Err(AppError::Unauthorized(
            "User account is not active".to_string(),
        ));
    }

    let access_token = services.tokens.generate_access_token(&TokenSubject::from(&user))?;

    Ok(RefreshedToken {
        access_token,
        expires_in: services.tokens.access_ttl().num_seconds(),
        token_type: "Bearer",
    })
}

/// Starts a password reset
///
/// Always succeeds with [`FORGOT_PASSWORD_MESSAGE`] so the response never
/// reveals whether an email is registered. Any earlier reset tokens of the
/// user stop working.
pub async fn forgot_password(
    services: &Services,
    req: ForgotPasswordRequest,
) -> AppResult<&'static str> {
    let email = normalize_email(&req.email);
    let mut session = services.db.begin().await?;

    let user = match session.users().find_by_email(&email).await? {
        Some(user) if !matches!(user.status, UserStatus::Invited | UserStatus::Inactive) => user,
        _ => return Ok(FORGOT_PASSWORD_MESSAGE),
    };

    let (token, token_hash) = one_time_token::generate();

    session.password_resets().delete_all_by_user(user.id).await?;
    session
        .password_resets()
        .create(NewPasswordReset {
            user_id: user.id,
            token_hash,
            expires_at: Utc::now() + reset_lifetime(),
        })
        .await?;
    session.commit().await?;

    info!(user_id = %user.id, token = one_time_token::log_prefix(&token), "Password reset issued");

    let Some(company_id) = user.company_id else {
        error!(user_id = %user.id, "User has no company during password reset");
        return Ok(FORGOT_PASSWORD_MESSAGE);
    };

    let company = match services.db.acquire().await?.companies().find_by_id(company_id).await? {
        Some(company) => company,
        None => {
            error!(user_id = %user.id, company_id = %company_id, "Company not found during password reset");
            return Ok(FORGOT_PASSWORD_MESSAGE);
        }
    };

    let link = services
        .settings
        .link(&format!("/reset-password?token={token}"));
    let message = templates::reset_password(&templates::ResetPassword {
        to: &user.email,
        first_name: &user.first_name,
        company_name: &company.name,
        reset_link: &link,
    });
    services.deliver("password_reset", message).await;

    Ok(FORGOT_PASSWORD_MESSAGE)
}

/// Completes a password reset
///
/// The token is single-use: the password change and the `is_used` flag are
/// written in one unit of work, and a token already marked used is
/// rejected even under a concurrent second attempt.
pub async fn reset_password(services: &Services, req: ResetPasswordRequest) -> AppResult<ResetOutcome> {
    let token_hash = one_time_token::hash_token(&req.token);
    let now = Utc::now();

    let mut session = services.db.begin().await?;

    let reset = session
        .password_resets()
        .find_by_token_hash(&token_hash)
        .await?
        .ok_or_else(|| {
            AppError::InvalidToken(
                "Invalid reset token. Please request a new password reset.".to_string(),
            )
        })?;

    if reset.is_expired(now) {
        return Err(AppError::TokenExpired(
            "Reset link has expired. Please request a new password reset.".to_string(),
        ));
    }

    if reset.is_used {
        return Err(already_used());
    }

    let user = session
        .users()
        .find_by_id(reset.user_id)
        .await?
        .ok_or_else(|| AppError::UserNotFound("User account not found.".to_string()))?;

    match user.status {
        UserStatus::Inactive => {
            return Err(AppError::UserInactive(
                "Your account is deactivated. Please contact support.".to_string(),
            ))
        }
        UserStatus::Invited => {
            return Err(AppError::UserInvited(
                "Please accept your invitation first to set your password.".to_string(),
            ))
        }
        UserStatus::Active | UserStatus::Blocked => {}
    }

    if services.passwords.verify(&req.new_password, &user.password_hash).await? {
        return Err(AppError::PasswordReuse(
            "Please choose a different password. You cannot reuse your current password"
                .to_string(),
        ));
    }

    let password_hash = services.passwords.hash(&req.new_password).await?;

    session
        .users()
        .update(
            user.id,
            UserChanges {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    if !session.password_resets().mark_used(reset.id, now).await? {
        session.rollback().await?;
        return Err(already_used());
    }

    session.commit().await.map_err(|e| {
        if e.is_conflict() {
            already_used()
        } else {
            e.into()
        }
    })?;

    info!(user_id = %user.id, "Password reset completed");

    let company_name = match user.company_id {
        Some(company_id) => services
            .db
            .acquire()
            .await?
            .companies()
            .find_by_id(company_id)
            .await?
            .map(|c| c.name),
        None => None,
    };

    let login_link = services.settings.link("/login");
    let changed_at = now.format("%Y-%m-%d %H:%M UTC").to_string();
    let message = templates::password_changed(&templates::PasswordChanged {
        to: &user.email,
        first_name: &user.first_name,
        company_name: company_name.as_deref().unwrap_or("devHelp"),
        login_link: &login_link,
        changed_at: &changed_at,
    });
    services.deliver("password_changed", message).await;

    Ok(ResetOutcome {
        message: "Password reset successfully. You can now login with your new password.",
        redirect_to: login_link,
    })
}

fn already_used() -> AppError {
    AppError::TokenAlreadyUsed(
        "This reset link has already been used. Please request a new password reset if needed."
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup_json() -> serde_json::Value {
        serde_json::json!({
            "companyName": "  Acme  ",
            "companyEmail": " HQ@Acme.IO ",
            "adminFirstName": "Jane",
            "adminLastName": "Doe",
            "adminEmail": "Jane@Acme.io",
            "password": "Str0ng!Pass",
            "agreeToTerms": true
        })
    }

    #[test]
    fn test_signup_request_is_normalized() {
        let req: SignupRequest = serde_json::from_value(signup_json()).unwrap();
        assert_eq!(req.company_name, "Acme");
        assert_eq!(req.company_email, "hq@acme.io");
        assert_eq!(req.admin_email, "jane@acme.io");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_signup_request_rejections() {
        let mut json = signup_json();
        json["password"] = "weakpassword".into();
        json["agreeToTerms"] = false.into();
        json["companyName"] = "A".into();

        let req: SignupRequest = serde_json::from_value(json).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("agree_to_terms"));
        assert!(fields.contains_key("company_name"));
        assert!(!fields.contains_key("admin_email"));
    }

    #[test]
    fn test_missing_terms_defaults_to_not_agreed() {
        let mut json = signup_json();
        json.as_object_mut().unwrap().remove("agreeToTerms");
        let req: SignupRequest = serde_json::from_value(json).unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("agree_to_terms"));
    }

    #[test]
    fn test_reset_request_password_mismatch() {
        let req: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "token": uuid::Uuid::new_v4().to_string().to_uppercase(),
            "newPassword": "Str0ng!Pass",
            "confirmPassword": "Str0ng!Pasz"
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields.len(), 1);
        assert_eq!(
            fields["confirm_password"][0].message.as_deref(),
            Some("Passwords don't match")
        );
    }

    #[test]
    fn test_reset_request_token_format() {
        let req: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "token": "not-a-token",
            "newPassword": "Str0ng!Pass",
            "confirmPassword": "Str0ng!Pass"
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("token"));
    }

    #[test]
    fn test_login_request_defaults() {
        let req: LoginRequest = serde_json::from_value(serde_json::json!({
            "email": "Jane@Acme.io",
            "password": "x"
        }))
        .unwrap();
        assert!(!req.remember_me);
        assert_eq!(req.email, "jane@acme.io");
        assert!(req.validate().is_ok());
    }
}
