/// Company model and database operations
///
/// A company is the tenant boundary: users, invites and (eventually) projects
/// all hang off a company. Companies are created by the signup flow and
/// managed by super admins.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE companies (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     phone VARCHAR(50),
///     website VARCHAR(512),
///     address JSONB,
///     status company_status NOT NULL DEFAULT 'active',
///     storage_used BIGINT NOT NULL DEFAULT 0,
///     storage_limit BIGINT NOT NULL DEFAULT 5368709120,
///     last_active_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::{contains_ignore_case, contains_pattern, Paginated, Pagination, ParseEnumError, SortOrder};

/// Default storage quota per company (5 GiB)
pub const DEFAULT_STORAGE_LIMIT: i64 = 5 * 1024 * 1024 * 1024;

/// Lifecycle status of a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "company_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Active,
    Inactive,
    Trial,
    Suspended,
    Deleted,
}

impl CompanyStatus {
    pub const ALL: [CompanyStatus; 5] = [
        CompanyStatus::Active,
        CompanyStatus::Inactive,
        CompanyStatus::Trial,
        CompanyStatus::Suspended,
        CompanyStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Active => "active",
            CompanyStatus::Inactive => "inactive",
            CompanyStatus::Trial => "trial",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for CompanyStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompanyStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("company status", s))
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postal address, stored as JSONB
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Tenant company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,

    /// Lowercased contact email, unique across companies
    pub email: String,

    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<Json<Address>>,
    pub status: CompanyStatus,

    /// Bytes in use
    pub storage_used: i64,

    /// Quota in bytes
    pub storage_limit: i64,

    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Last activity, falling back to the last update
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active_at.unwrap_or(self.updated_at)
    }
}

/// Input for creating a company
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub email: String,
    pub status: CompanyStatus,
}

/// Company row plus its headcount, used by the super-admin listing
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CompanySummary {
    #[sqlx(flatten)]
    pub company: Company,
    pub total_users: i64,
}

/// Sort key for the company listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanySort {
    #[serde(rename = "name")]
    Name,
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "lastActive")]
    LastActive,
}

impl CompanySort {
    fn as_sql(&self) -> &'static str {
        match self {
            CompanySort::Name => "c.name",
            CompanySort::CreatedAt => "c.created_at",
            CompanySort::LastActive => "COALESCE(c.last_active_at, c.updated_at)",
        }
    }
}

/// Filter, sort and page for the company listing
#[derive(Debug, Clone)]
pub struct CompanyQuery {
    /// Substring matched case-insensitively against name and email
    pub search: Option<String>,
    pub status: Option<CompanyStatus>,
    pub sort_by: CompanySort,
    pub sort_order: SortOrder,
    pub page: Pagination,
}

impl CompanyQuery {
    pub fn matches(&self, company: &Company) -> bool {
        let search_ok = match self.search.as_deref() {
            Some(search) => {
                contains_ignore_case(&company.name, search)
                    || contains_ignore_case(&company.email, search)
            }
            None => true,
        };
        search_ok && self.status.map_or(true, |status| company.status == status)
    }

    /// Orders two companies the way the SQL listing does
    pub fn compare(&self, a: &Company, b: &Company) -> std::cmp::Ordering {
        let ordering = match self.sort_by {
            CompanySort::Name => a.name.cmp(&b.name),
            CompanySort::CreatedAt => a.created_at.cmp(&b.created_at),
            CompanySort::LastActive => a.last_active().cmp(&b.last_active()),
        };
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Platform-wide counters for the super-admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct PlatformStats {
    pub total_companies: i64,
    pub active_companies: i64,
    pub inactive_companies: i64,
    pub suspended_companies: i64,
    pub trial_companies: i64,
    pub total_users: i64,
}

impl Company {
    /// Creates a company
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `companies_email_key` if the email is taken.
    pub async fn create<'e, E>(executor: E, data: &NewCompany) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (name, email, status)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, phone, website, address, status, storage_used,
                      storage_limit, last_active_at, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.email)
        .bind(data.status)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, email, phone, website, address, status, storage_used,
                   storage_limit, last_active_at, created_at, updated_at
            FROM companies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, email, phone, website, address, status, storage_used,
                   storage_limit, last_active_at, created_at, updated_at
            FROM companies
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Sets the status of a company
    ///
    /// Returns the updated company, or None if it does not exist.
    pub async fn update_status<'e, E>(
        executor: E,
        id: Uuid,
        status: CompanyStatus,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Company>(
            r#"
            UPDATE companies
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, phone, website, address, status, storage_used,
                      storage_limit, last_active_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM companies")
            .fetch_one(executor)
            .await?;

        Ok(count.0)
    }

    /// Lists companies with their headcount
    ///
    /// The ORDER BY clause is chosen from a fixed set of columns, never from input.
    pub async fn list(
        conn: &mut PgConnection,
        query: &CompanyQuery,
    ) -> Result<Paginated<CompanySummary>, sqlx::Error> {
        let search = query.search.as_deref().map(contains_pattern);

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM companies c
            WHERE ($1::text IS NULL OR c.name ILIKE $1 OR c.email ILIKE $1)
              AND ($2::company_status IS NULL OR c.status = $2)
            "#,
        )
        .bind(&search)
        .bind(query.status)
        .fetch_one(&mut *conn)
        .await?;

        let sql = format!(
            r#"
            SELECT c.id, c.name, c.email, c.phone, c.website, c.address, c.status,
                   c.storage_used, c.storage_limit, c.last_active_at, c.created_at,
                   c.updated_at,
                   (SELECT COUNT(*) FROM users u WHERE u.company_id = c.id) AS total_users
            FROM companies c
            WHERE ($1::text IS NULL OR c.name ILIKE $1 OR c.email ILIKE $1)
              AND ($2::company_status IS NULL OR c.status = $2)
            ORDER BY {} {}, c.id
            LIMIT $3 OFFSET $4
            "#,
            query.sort_by.as_sql(),
            query.sort_order.as_sql(),
        );

        let items = sqlx::query_as::<_, CompanySummary>(&sql)
            .bind(&search)
            .bind(query.status)
            .bind(query.page.limit())
            .bind(query.page.offset())
            .fetch_all(&mut *conn)
            .await?;

        Ok(Paginated {
            items,
            total: total.0,
        })
    }

    /// Counts companies by status plus all users on the platform
    pub async fn platform_stats<'e, E>(executor: E) -> Result<PlatformStats, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PlatformStats>(
            r#"
            SELECT COUNT(*) AS total_companies,
                   COUNT(*) FILTER (WHERE status = 'active') AS active_companies,
                   COUNT(*) FILTER (WHERE status = 'inactive') AS inactive_companies,
                   COUNT(*) FILTER (WHERE status = 'suspended') AS suspended_companies,
                   COUNT(*) FILTER (WHERE status = 'trial') AS trial_companies,
                   (SELECT COUNT(*) FROM users) AS total_users
            FROM companies
            "#,
        )
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn company(name: &str, created_offset_secs: i64) -> Company {
        let base = Utc::now();
        Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            website: None,
            address: None,
            status: CompanyStatus::Active,
            storage_used: 0,
            storage_limit: DEFAULT_STORAGE_LIMIT,
            last_active_at: None,
            created_at: base + Duration::seconds(created_offset_secs),
            updated_at: base + Duration::seconds(created_offset_secs),
        }
    }

    fn query(sort_by: CompanySort, sort_order: SortOrder) -> CompanyQuery {
        CompanyQuery {
            search: None,
            status: None,
            sort_by,
            sort_order,
            page: Pagination::new(1, 20),
        }
    }

    #[test]
    fn test_default_storage_limit_is_five_gib() {
        assert_eq!(DEFAULT_STORAGE_LIMIT, 5_368_709_120);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("suspended".parse::<CompanyStatus>().unwrap(), CompanyStatus::Suspended);
        assert!("archived".parse::<CompanyStatus>().is_err());
        assert!("".parse::<CompanyStatus>().is_err());
    }

    #[test]
    fn test_sort_deserializes_camel_case() {
        let sort: CompanySort = serde_json::from_str("\"lastActive\"").unwrap();
        assert_eq!(sort, CompanySort::LastActive);
        assert_eq!(CompanySort::default(), CompanySort::CreatedAt);
    }

    #[test]
    fn test_compare_orders_by_created_at_desc() {
        let older = company("Older", 0);
        let newer = company("Newer", 60);
        let q = query(CompanySort::CreatedAt, SortOrder::Desc);

        let mut list = vec![older.clone(), newer.clone()];
        list.sort_by(|a, b| q.compare(a, b));
        assert_eq!(list[0].id, newer.id);
    }

    #[test]
    fn test_compare_by_name_asc() {
        let q = query(CompanySort::Name, SortOrder::Asc);
        let mut list = vec![company("Zeta", 0), company("Acme", 0)];
        list.sort_by(|a, b| q.compare(a, b));
        assert_eq!(list[0].name, "Acme");
    }

    #[test]
    fn test_last_active_falls_back_to_updated_at() {
        let mut c = company("Acme", 0);
        assert_eq!(c.last_active(), c.updated_at);

        let active = c.updated_at + Duration::hours(1);
        c.last_active_at = Some(active);
        assert_eq!(c.last_active(), active);
    }

    #[test]
    fn test_query_matches_search_and_status() {
        let mut q = query(CompanySort::CreatedAt, SortOrder::Desc);
        q.search = Some("ACM".to_string());
        assert!(q.matches(&company("Acme", 0)));

        q.status = Some(CompanyStatus::Trial);
        assert!(!q.matches(&company("Acme", 0)));
    }
}
