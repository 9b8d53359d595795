/// Company invitations
///
/// An admin invites a member by email. The invitee verifies the emailed link
/// and accepts it by choosing a password, which creates (or reactivates) their
/// account and signs them in.
///
/// Invites move `pending → accepted | expired | cancelled`. A pending invite
/// found past its expiry is flipped to `expired` on the spot, outside any
/// transaction, so the state sticks even though the request fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::rules::{agreed_to_terms, invitation_token};
use super::{auth_payload, de, CompanyRef, PermissionSet, Services, SessionGrant};
use crate::auth::authorization::{permissions_for, redirect_path, require_company};
use crate::auth::jwt::TokenSubject;
use crate::auth::middleware::AuthContext;
use crate::auth::one_time_token;
use crate::auth::password::validate_password_policy;
use crate::error::{AppError, AppResult};
use crate::mail::templates;
use crate::models::company::{Company, CompanyStatus};
use crate::models::invite::{invite_lifetime, Invite, InviteStatus, NewInvite};
use crate::models::user::{NewUser, User, UserChanges, UserRole, UserStatus};
use crate::store::{constraints, Session};

const EXPIRED_MESSAGE: &str = "This invitation has expired. Please contact the person who invited you to request a new invitation.";
const ALREADY_ACCEPTED_MESSAGE: &str =
    "This invitation has already been used. Please login to your account.";
const MISSING_INVITE_MESSAGE: &str = "Invalid invitation link. This invitation does not exist.";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendInviteRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[serde(deserialize_with = "de::trimmed")]
    #[validate(length(min = 2, max = 100, message = "First Name must be between 2 and 100 characters"))]
    pub first_name: String,

    #[serde(deserialize_with = "de::trimmed")]
    #[validate(length(min = 2, max = 100, message = "Last Name must be between 2 and 100 characters"))]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(custom(function = "invitation_token"))]
    pub token: String,

    #[validate(
        length(min = 8, max = 120, message = "Password must be between 8 and 120 characters"),
        custom(function = "validate_password_policy")
    )]
    pub password: String,

    #[validate(
        length(min = 1, message = "Please confirm your password"),
        must_match(other = "password", message = "Passwords don't match")
    )]
    pub confirm_password: String,

    #[serde(default)]
    #[validate(custom(function = "agreed_to_terms"))]
    pub agree_to_terms: bool,
}

/// Who sent an invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviterRef {
    pub id: Uuid,
    pub name: String,

    /// The inviter's role, or "unknown" once their account is gone
    pub role: String,
}

impl InviterRef {
    fn resolve(invite: &Invite, inviter: Option<&User>) -> Self {
        match inviter {
            Some(user) => Self {
                id: user.id,
                name: user.full_name(),
                role: user.role.to_string(),
            },
            None => Self {
                id: invite.invited_by,
                name: "Former Team Member".to_string(),
                role: "unknown".to_string(),
            },
        }
    }
}

/// A freshly sent invitation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationView {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: InviteStatus,
    pub company: CompanyRef,
    pub invited_by: InviterRef,
    pub invited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What the accept-invite page shows before the invitee sets a password
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteDetails {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub company: CompanyRef,
    pub invited_by: InviterRef,
    pub invited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Sends an invitation into the caller's company
///
/// # Errors
///
/// - `CANNOT_INVITE_SELF` when the invitee is the caller
/// - `EMAIL_EXISTS` / `INVITE_EXISTS` when the invitee already belongs to the company
/// - `INVITE_ALREADY_SENT` when an unexpired pending invite exists
pub async fn send_invite(
    services: &Services,
    auth: &AuthContext,
    req: SendInviteRequest,
) -> AppResult<InvitationView> {
    let company_id = require_company(auth)?;
    let now = Utc::now();

    let mut session = services.db.begin().await?;

    let inviter = session
        .users()
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    if inviter.email.eq_ignore_ascii_case(&req.email) {
        return Err(AppError::CannotInviteSelf(
            "You cannot invite yourself".to_string(),
        ));
    }

    let company = session
        .companies()
        .find_by_id(company_id)
        .await?
        .ok_or_else(AppError::company_not_found)?;

    if let Some(existing) = session
        .users()
        .find_by_email_and_company(&req.email, company.id)
        .await?
    {
        match existing.status {
            UserStatus::Active => {
                return Err(AppError::EmailAlreadyExists(
                    "User with this email is already active in your company".to_string(),
                ))
            }
            UserStatus::Invited => {
                return Err(AppError::InviteAlreadyExists(
                    "User already has a pending invitation. Use resend feature instead."
                        .to_string(),
                ))
            }
            UserStatus::Inactive | UserStatus::Blocked => {}
        }
    }

    if let Some(pending) = session
        .invites()
        .find_pending_by_email_and_company(&req.email, company.id)
        .await?
    {
        if !pending.is_past_expiry(now) {
            return Err(AppError::InviteAlreadySent(
                "Invite already sent. Use resend feature".to_string(),
            ));
        }
        session.invites().delete(pending.id).await?;
    }

    let (token, token_hash) = one_time_token::generate();
    let lifetime = invite_lifetime();

    let invite = session
        .invites()
        .create(NewInvite {
            token_hash,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            role: UserRole::Member,
            company_id: company.id,
            invited_by: inviter.id,
            expires_at: now + lifetime,
        })
        .await?;

    session.commit().await?;

    info!(
        invite_id = %invite.id,
        company_id = %company.id,
        invited_by = %inviter.id,
        token = one_time_token::log_prefix(&token),
        "Invitation created"
    );

    let inviter_name = inviter.full_name();
    let link = services.settings.link(&format!("/accept-invite?token={token}"));
    let message = templates::company_invite(&templates::CompanyInvite {
        to: &invite.email,
        first_name: &invite.first_name,
        inviter_name: &inviter_name,
        company_name: &company.name,
        invite_link: &link,
        expires_in_days: lifetime.num_days(),
    });
    services.deliver("company_invite", message).await;

    Ok(InvitationView {
        id: invite.id,
        email: invite.email.clone(),
        first_name: invite.first_name.clone(),
        last_name: invite.last_name.clone(),
        role: invite.role,
        status: invite.status,
        company: CompanyRef::from(&company),
        invited_by: InviterRef::resolve(&invite, Some(&inviter)),
        invited_at: invite.created_at,
        expires_at: invite.expires_at,
    })
}

/// Checks an invite link without consuming it
pub async fn verify_invite(services: &Services, token: Option<&str>) -> AppResult<InviteDetails> {
    let token = token
        .map(one_time_token::normalize)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidInviteToken(MISSING_INVITE_MESSAGE.to_string()))?;

    if !one_time_token::is_uuid_v4(&token) {
        return Err(AppError::InvalidTokenFormat(
            "Invalid invitation link format".to_string(),
        ));
    }

    let mut session = services.db.acquire().await?;
    let (invite, company) =
        load_open_invite(services, session.as_mut(), &token, "Invalid invite token").await?;

    let inviter = session.users().find_by_id(invite.invited_by).await?;

    Ok(InviteDetails {
        email: invite.email.clone(),
        first_name: invite.first_name.clone(),
        last_name: invite.last_name.clone(),
        role: invite.role,
        company: CompanyRef::from(&company),
        invited_by: InviterRef::resolve(&invite, inviter.as_ref()),
        invited_at: invite.created_at,
        expires_at: invite.expires_at,
    })
}

/// Accepts an invite, activating the invitee's account and signing them in
///
/// User creation or reactivation and the invite's move to `accepted` share
/// one unit of work. An invite can be accepted at most once.
pub async fn accept_invite(services: &Services, req: AcceptInviteRequest) -> AppResult<SessionGrant> {
    let mut session = services.db.begin().await?;

    let (invite, company) =
        load_open_invite(services, session.as_mut(), &req.token, MISSING_INVITE_MESSAGE).await?;

    let existing = session
        .users()
        .find_by_email_and_company(&invite.email, invite.company_id)
        .await?;

    if matches!(&existing, Some(user) if user.status == UserStatus::Active) {
        return Err(AppError::EmailAlreadyExists(
            "An account with this email already exists in this company. Please login instead."
                .to_string(),
        ));
    }

    let password_hash = services.passwords.hash(&req.password).await?;

    let user = match existing {
        Some(user) => {
            info!(user_id = %user.id, previous_status = %user.status, "Reactivating user from invite");
            session
                .users()
                .update(
                    user.id,
                    UserChanges {
                        first_name: Some(invite.first_name.clone()),
                        last_name: Some(invite.last_name.clone()),
                        password_hash: Some(password_hash),
                        role: Some(invite.role),
                        status: Some(UserStatus::Active),
                        ..Default::default()
                    },
                )
                .await?
                .ok_or_else(AppError::user_not_found)?
        }
        None => session
            .users()
            .create(NewUser {
                first_name: invite.first_name.clone(),
                last_name: invite.last_name.clone(),
                email: invite.email.clone(),
                password_hash,
                role: invite.role,
                status: UserStatus::Active,
                company_id: Some(invite.company_id),
            })
            .await
            .map_err(|e| match e.violated_constraint() {
                Some(constraints::USERS_EMAIL) => {
                    AppError::EmailAlreadyExists("Email already registered".to_string())
                }
                _ => e.into(),
            })?,
    };

    let accepted = session
        .invites()
        .transition(invite.id, InviteStatus::Accepted, Utc::now())
        .await?;

    if accepted.is_none() {
        session.rollback().await?;
        return Err(AppError::InvitationAlreadyAccepted(
            ALREADY_ACCEPTED_MESSAGE.to_string(),
        ));
    }

    session.commit().await.map_err(|e| {
        if e.is_conflict() {
            AppError::InvitationAlreadyAccepted(ALREADY_ACCEPTED_MESSAGE.to_string())
        } else {
            e.into()
        }
    })?;

    info!(invite_id = %invite.id, user_id = %user.id, company_id = %company.id, "Invitation accepted");

    let pair = services.tokens.generate_token_pair(&TokenSubject::from(&user))?;
    let dashboard = services.settings.link(redirect_path(user.role));

    let message = templates::welcome(&templates::Welcome {
        to: &user.email,
        first_name: &user.first_name,
        company_name: &company.name,
        dashboard_link: &dashboard,
    });
    services.deliver("welcome", message).await;

    let payload = auth_payload(
        services,
        &user,
        Some(&company),
        pair.access_token,
        PermissionSet::Company(permissions_for(user.role)),
        dashboard,
    );

    Ok(SessionGrant {
        message: format!("Account activated successfully. Welcome to {}!", company.name),
        payload,
        refresh_token: pair.refresh_token,
        refresh_max_age: services.settings.refresh_ttl,
    })
}

/// Finds a pending, unexpired invite whose company can still take members
///
/// Checks run in order: accepted, cancelled, expired, pending past expiry,
/// then the company.
async fn load_open_invite(
    services: &Services,
    session: &mut dyn Session,
    token: &str,
    not_found_message: &str,
) -> AppResult<(Invite, Company)> {
    let invite = match session
        .invites()
        .find_by_token_hash(&one_time_token::hash_token(token))
        .await?
    {
        Some(invite) => invite,
        None => {
            warn!(token = one_time_token::log_prefix(token), "Invite token not found");
            return Err(AppError::InvalidInviteToken(not_found_message.to_string()));
        }
    };

    match invite.status {
        InviteStatus::Accepted => {
            return Err(AppError::InvitationAlreadyAccepted(
                ALREADY_ACCEPTED_MESSAGE.to_string(),
            ))
        }
        InviteStatus::Cancelled => {
            return Err(AppError::InviteCancelled(
                "This invitation has been cancelled. Please contact your company administrator if you believe this is a mistake."
                    .to_string(),
            ))
        }
        InviteStatus::Expired => return Err(AppError::InviteExpired(EXPIRED_MESSAGE.to_string())),
        InviteStatus::Pending => {}
    }

    if invite.is_past_expiry(Utc::now()) {
        expire(services, &invite).await;
        return Err(AppError::InviteExpired(EXPIRED_MESSAGE.to_string()));
    }

    let company = session
        .companies()
        .find_by_id(invite.company_id)
        .await?
        .ok_or_else(AppError::company_not_found)?;

    match company.status {
        CompanyStatus::Active | CompanyStatus::Trial => Ok((invite, company)),
        CompanyStatus::Inactive => Err(AppError::CompanyInactive(
            "The company account is currently inactive. Please contact support for assistance."
                .to_string(),
        )),
        CompanyStatus::Suspended => Err(AppError::CompanySuspended(
            "The company account is currently suspended. Please contact support for assistance."
                .to_string(),
        )),
        CompanyStatus::Deleted => Err(AppError::CompanyNotFound(
            "The company associated with this invitation no longer exists.".to_string(),
        )),
    }
}

/// Persists the lazy expiry on its own autocommit session
async fn expire(services: &Services, invite: &Invite) {
    let result = match services.db.acquire().await {
        Ok(mut session) => session
            .invites()
            .transition(invite.id, InviteStatus::Expired, Utc::now())
            .await
            .map(|_| ()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => info!(invite_id = %invite.id, "Invitation marked expired"),
        Err(e) => error!(invite_id = %invite.id, error = %e, "Failed to mark invitation expired"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_request_validation() {
        let req: AcceptInviteRequest = serde_json::from_value(serde_json::json!({
            "token": format!(" {} ", Uuid::new_v4()),
            "password": "Str0ng!Pass",
            "confirmPassword": "Str0ng!Pass",
            "agreeToTerms": true
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.token.len(), 36);

        let bad: AcceptInviteRequest = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "password": "Str0ng!Pass",
            "confirmPassword": "different",
            "agreeToTerms": false
        }))
        .unwrap();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("token"));
        assert!(fields.contains_key("confirm_password"));
        assert!(fields.contains_key("agree_to_terms"));
    }

    #[test]
    fn test_send_request_validation() {
        let req: SendInviteRequest = serde_json::from_value(serde_json::json!({
            "email": " Bob@Acme.IO",
            "firstName": "B",
            "lastName": "Builder"
        }))
        .unwrap();
        assert_eq!(req.email, "bob@acme.io");
        assert!(req.validate().unwrap_err().field_errors().contains_key("first_name"));
    }
}
