/// Role checks, permission sets and post-login redirects
///
/// # Example
///
/// ```
/// use devhelp_shared::auth::authorization::{permissions_for, redirect_path};
/// use devhelp_shared::models::user::UserRole;
///
/// assert!(permissions_for(UserRole::Admin).manage_users);
/// assert_eq!(redirect_path(UserRole::Member), "/member/dashboard");
/// ```

use serde::Serialize;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::error::{AppError, AppResult};
use crate::models::user::UserRole;

/// Capabilities of a company user, sent to the frontend after login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub manage_users: bool,
    pub manage_projects: bool,
    pub manage_tasks: bool,
    pub view_analytics: bool,
}

/// Capabilities of a platform operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformPermissions {
    pub manage_platform: bool,
    pub manage_companies: bool,
    pub view_all_data: bool,
}

pub const SUPER_ADMIN_PERMISSIONS: PlatformPermissions = PlatformPermissions {
    manage_platform: true,
    manage_companies: true,
    view_all_data: true,
};

pub const SUPER_ADMIN_DASHBOARD: &str = "/super-admin/dashboard";

/// Admins get everything, everyone else nothing
pub fn permissions_for(role: UserRole) -> Permissions {
    let granted = role == UserRole::Admin;
    Permissions {
        manage_users: granted,
        manage_projects: granted,
        manage_tasks: granted,
        view_analytics: granted,
    }
}

/// Dashboard a user lands on after authenticating
pub fn redirect_path(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "/admin/dashboard",
        UserRole::SuperAdmin => SUPER_ADMIN_DASHBOARD,
        UserRole::Member => "/member/dashboard",
    }
}

/// Company admins only
pub fn require_admin(auth: &AuthContext) -> AppResult<()> {
    if auth.role == UserRole::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Access denied. Admin role required.".to_string(),
        ))
    }
}

/// Platform super admins only
pub fn require_super_admin(auth: &AuthContext) -> AppResult<()> {
    if auth.role == UserRole::SuperAdmin {
        Ok(())
    } else {
        Err(AppError::UnauthorizedSuperAdmin(
            "Super admin access required".to_string(),
        ))
    }
}

/// Company the caller acts within
pub fn require_company(auth: &AuthContext) -> AppResult<Uuid> {
    auth.company_id.ok_or_else(|| {
        AppError::Unauthorized("User is not associated with a company".to_string())
    })
}
