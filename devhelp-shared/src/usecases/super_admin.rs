/// Platform operator console: super-admin login and company management
///
/// Super admins belong to no company. Their tokens carry no `company_id`,
/// and every route here sits behind the super-admin guard except login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{auth_payload, de, PageInfo, PermissionSet, Services, SessionGrant};
use crate::auth::authorization::{SUPER_ADMIN_DASHBOARD, SUPER_ADMIN_PERMISSIONS};
use crate::auth::jwt::TokenSubject;
use crate::auth::one_time_token;
use crate::error::{AppError, AppResult};
use crate::models::company::{Address, CompanyQuery, CompanySort, CompanyStatus};
use crate::models::user::{UserChanges, UserRole, UserStatus};
use crate::models::{Pagination, SortOrder};

pub const DEFAULT_COMPANIES_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SuperAdminLoginRequest {
    #[serde(deserialize_with = "de::lower_trimmed")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListCompaniesQuery {
    #[serde(default)]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<u32>,

    #[serde(default)]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,

    #[serde(default, deserialize_with = "de::non_blank")]
    pub search: Option<String>,

    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub status: Option<CompanyStatus>,

    #[serde(default)]
    pub sort_by: Option<CompanySort>,

    #[serde(default)]
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCompanyStatusRequest {
    pub status: CompanyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyListItem {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: CompanyStatus,
    pub total_users: i64,
    pub total_projects: i64,
    pub monthly_revenue: i64,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatsView {
    pub total_companies: i64,
    pub active_companies: i64,
    pub inactive_companies: i64,
    pub suspended_companies: i64,
    pub trial_companies: i64,
    pub total_users: i64,
    pub total_projects: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyList {
    pub companies: Vec<CompanyListItem>,
    pub pagination: PageInfo,
    pub stats: PlatformStatsView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyAdmin {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub last_login: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
}

/// Billing is not tracked yet; every field is a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Billing {
    pub monthly_revenue: i64,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub monthly_revenue: i64,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<Address>,
    pub status: CompanyStatus,
    pub total_users: i64,
    pub active_users: i64,
    pub total_projects: i64,
    pub active_projects: i64,
    pub storage_used: i64,
    pub storage_limit: i64,
    pub admin: Option<CompanyAdmin>,
    pub stats: TaskStats,
    pub billing: Billing,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyStatusChange {
    pub id: Uuid,
    pub status: CompanyStatus,
}

fn invalid_super_admin(message: &str) -> AppError {
    AppError::InvalidSuperAdminCredentials(message.to_string())
}

/// Signs in a platform super admin
///
/// Unknown emails, non-super-admin accounts and wrong passwords are
/// indistinguishable to the caller.
pub async fn login(services: &Services, req: SuperAdminLoginRequest) -> AppResult<SessionGrant> {
    let mut session = services.db.acquire().await?;

    let user = match session.users().find_by_email(&req.email).await? {
        Some(user) if user.role == UserRole::SuperAdmin => user,
        _ => {
            warn!(email = %req.email, "Super admin login failed - unknown account");
            return Err(invalid_super_admin("Invalid email or password"));
        }
    };

    if !services.passwords.verify(&req.password, &user.password_hash).await? {
        warn!(email = %req.email, "Super admin login failed - invalid password");
        return Err(invalid_super_admin("Invalid email or password"));
    }

    if user.status != UserStatus::Active {
        return Err(invalid_super_admin("Super admin account is not active"));
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

    info!(user_id = %user.id, "Super admin login successful");

    let subject = TokenSubject {
        company_id: None,
        ..TokenSubject::from(&user)
    };
    let pair = services.tokens.generate_token_pair(&subject)?;
    let payload = auth_payload(
        services,
        &user,
        None,
        pair.access_token,
        PermissionSet::Platform(SUPER_ADMIN_PERMISSIONS),
        SUPER_ADMIN_DASHBOARD.to_string(),
    );

    Ok(SessionGrant {
        message: "Login successful".to_string(),
        payload,
        refresh_token: pair.refresh_token,
        refresh_max_age: services.settings.refresh_ttl,
    })
}

/// Lists companies with headcounts plus platform-wide counters
pub async fn list_companies(services: &Services, query: ListCompaniesQuery) -> AppResult<CompanyList> {
    let page = Pagination::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_COMPANIES_PAGE_SIZE),
    );
    let company_query = CompanyQuery {
        search: query.search,
        status: query.status,
        sort_by: query.sort_by.unwrap_or_default(),
        sort_order: query.sort_order.unwrap_or_default(),
        page,
    };

    let mut session = services.db.acquire().await?;
    let found = session.companies().list(&company_query).await?;
    let stats = session.companies().platform_stats().await?;

    let companies = found
        .items
        .into_iter()
        .map(|summary| CompanyListItem {
            id: summary.company.id,
            last_active_at: summary.company.last_active(),
            name: summary.company.name,
            email: summary.company.email,
            status: summary.company.status,
            total_users: summary.total_users,
            total_projects: 0,
            monthly_revenue: 0,
            created_at: summary.company.created_at,
        })
        .collect();

    Ok(CompanyList {
        companies,
        pagination: PageInfo::new(page.page, page.limit, found.total),
        stats: PlatformStatsView {
            total_companies: stats.total_companies,
            active_companies: stats.active_companies,
            inactive_companies: stats.inactive_companies,
            suspended_companies: stats.suspended_companies,
            trial_companies: stats.trial_companies,
            total_users: stats.total_users,
            total_projects: 0,
        },
    })
}

/// Parses a company id from a path segment
fn parse_company_id(raw: &str) -> AppResult<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidCompanyId(
            "The provided company ID is invalid or does not exist".to_string(),
        ));
    }
    if !one_time_token::is_uuid_v4(raw) {
        return Err(AppError::InvalidCompanyId(
            "Invalid company ID format".to_string(),
        ));
    }
    Uuid::parse_str(raw)
        .map_err(|_| AppError::InvalidCompanyId("Invalid company ID format".to_string()))
}

pub async fn get_company(services: &Services, raw_id: &str) -> AppResult<CompanyDetail> {
    let id = parse_company_id(raw_id)?;
    let mut session = services.db.acquire().await?;

    let company = session
        .companies()
        .find_by_id(id)
        .await?
        .ok_or_else(AppError::company_not_found)?;

    if company.status == CompanyStatus::Deleted {
        return Err(AppError::CompanyNotFound(
            "Company has been deleted".to_string(),
        ));
    }

    let counts = session.users().count_by_company(company.id).await?;
    let admin = session.users().find_company_admin(company.id).await?;

    if admin.is_none() {
        warn!(company_id = %company.id, "Company has no active admin");
    }

    Ok(CompanyDetail {
        id: company.id,
        monthly_revenue: 0,
        phone: company.phone.clone(),
        website: company.website.clone(),
        address: company.address.as_ref().map(|json| json.0.clone()),
        status: company.status,
        total_users: counts.total,
        active_users: counts.active,
        total_projects: 0,
        active_projects: 0,
        storage_used: company.storage_used,
        storage_limit: company.storage_limit,
        admin: admin.map(|user| CompanyAdmin {
            id: user.id,
            name: user.full_name(),
            email: user.email.clone(),
            last_login: user.last_login.unwrap_or(user.updated_at),
        }),
        stats: TaskStats {
            total_tasks: 0,
            completed_tasks: 0,
        },
        billing: Billing {
            monthly_revenue: 0,
            last_payment_date: None,
            next_billing_date: None,
        },
        created_at: company.created_at,
        last_active_at: company.last_active(),
        name: company.name,
        email: company.email,
    })
}

/// Changes a company's lifecycle status; returns the message and the change
pub async fn update_company_status(
    services: &Services,
    raw_id: &str,
    req: UpdateCompanyStatusRequest,
) -> AppResult<(String, CompanyStatusChange)> {
    let id = parse_company_id(raw_id)?;

    let mut session = services.db.begin().await?;
    let company = session
        .companies()
        .update_status(id, req.status)
        .await?
        .ok_or_else(AppError::company_not_found)?;
    session.commit().await?;

    info!(company_id = %company.id, status = %company.status, "Company status updated");

    Ok((
        format!("Company status updated to {}", company.status),
        CompanyStatusChange {
            id: company.id,
            status: company.status,
        },
    ))
}
