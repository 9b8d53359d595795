/// Company user management for admins and members

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{de, PageInfo, Services};
use crate::auth::authorization::require_company;
use crate::auth::middleware::AuthContext;
use crate::error::{AppError, AppResult};
use crate::models::invite::Invite;
use crate::models::user::{User, UserChanges, UserFilter, UserRole, UserStatus};
use crate::models::Pagination;

pub const DEFAULT_USERS_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ListUsersQuery {
    #[serde(default)]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<u32>,

    #[serde(default)]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,

    #[serde(default, deserialize_with = "de::non_blank")]
    pub search: Option<String>,

    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub status: Option<UserStatus>,

    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub role: Option<UserRole>,
}

/// Statuses an admin may set on a company user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagedStatus {
    Active,
    Blocked,
}

impl From<ManagedStatus> for UserStatus {
    fn from(status: ManagedStatus) -> Self {
        match status {
            ManagedStatus::Active => UserStatus::Active,
            ManagedStatus::Blocked => UserStatus::Blocked,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUserStatusRequest {
    pub status: ManagedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            status: user.status,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Pending invites are listed as users in the `invited` state
impl From<Invite> for UserSummary {
    fn from(invite: Invite) -> Self {
        Self {
            id: invite.id,
            first_name: invite.first_name,
            last_name: invite.last_name,
            email: invite.email,
            role: invite.role,
            status: UserStatus::Invited,
            last_login: None,
            created_at: invite.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserList {
    pub users: Vec<UserSummary>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStatusChange {
    pub id: Uuid,
    pub status: UserStatus,
}

/// Lists the caller's company
///
/// `status=invited` lists pending invites instead of user rows.
pub async fn list_users(
    services: &Services,
    auth: &AuthContext,
    query: ListUsersQuery,
) -> AppResult<UserList> {
    let company_id = require_company(auth)?;
    let page = Pagination::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_USERS_PAGE_SIZE),
    );

    let mut session = services.db.acquire().await?;

    let (users, total) = if query.status == Some(UserStatus::Invited) {
        let invites = session
            .invites()
            .list_pending_by_company(company_id, query.search.as_deref(), page)
            .await?;
        let users: Vec<UserSummary> = invites.items.into_iter().map(UserSummary::from).collect();
        (users, invites.total)
    } else {
        let filter = UserFilter {
            search: query.search.clone(),
            status: query.status,
            role: query.role,
        };
        let found = session
            .users()
            .list_by_company(company_id, &filter, page)
            .await?;
        let users: Vec<UserSummary> = found.items.into_iter().map(UserSummary::from).collect();
        (users, found.total)
    };

    info!(
        company_id = %company_id,
        page = page.page,
        limit = page.limit,
        total,
        status = ?query.status,
        "Fetched company users"
    );

    Ok(UserList {
        users,
        pagination: PageInfo::new(page.page, page.limit, total),
    })
}

/// Blocks or unblocks a user of the caller's company
///
/// Returns the response message together with the change.
pub async fn update_user_status(
    services: &Services,
    auth: &AuthContext,
    user_id: Uuid,
    req: UpdateUserStatusRequest,
) -> AppResult<(&'static str, UserStatusChange)> {
    let company_id = require_company(auth)?;
    let status = UserStatus::from(req.status);

    let mut session = services.db.begin().await?;

    let user = session
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    if user.company_id != Some(company_id) {
        return Err(AppError::Unauthorized(
            "You do not have permission to manage this user.".to_string(),
        ));
    }

    if user.id == auth.user_id {
        return Err(AppError::Forbidden(
            "You cannot change your own status".to_string(),
        ));
    }

    let updated = session
        .users()
        .update(
            user.id,
            UserChanges {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(AppError::user_not_found)?;

    session.commit().await?;

    info!(
        user_id = %user.id,
        old_status = %user.status,
        new_status = %updated.status,
        updated_by = %auth.user_id,
        "User status updated"
    );

    let message = match req.status {
        ManagedStatus::Active => "User unblocked successfully",
        ManagedStatus::Blocked => "User blocked successfully",
    };

    Ok((
        message,
        UserStatusChange {
            id: updated.id,
            status: updated.status,
        },
    ))
}
