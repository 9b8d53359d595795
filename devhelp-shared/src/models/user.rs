/// User model and database operations
///
/// Users are company admins, company members, or platform super admins.
/// Every user except a super admin belongs to exactly one company.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     role user_role NOT NULL DEFAULT 'member',
///     status user_status NOT NULL DEFAULT 'active',
///     company_id UUID REFERENCES companies(id),
///     phone VARCHAR(50),
///     last_login TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use devhelp_shared::models::user::{NewUser, User, UserRole, UserStatus};
/// use devhelp_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, &NewUser {
///     first_name: "Jane".to_string(),
///     last_name: "Doe".to_string(),
///     email: "jane@acme.io".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     role: UserRole::Member,
///     status: UserStatus::Active,
///     company_id: None,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "jane@acme.io").await?;
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::{contains_ignore_case, contains_pattern, Paginated, Pagination, ParseEnumError};

/// Role of a user on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Company administrator
    Admin,

    /// Regular company member
    Member,

    /// Platform operator, not bound to a company
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Member => "member",
            UserRole::SuperAdmin => "super_admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "member" => Ok(UserRole::Member),
            "super_admin" => Ok(UserRole::SuperAdmin),
            other => Err(ParseEnumError::new("user role", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Can log in
    Active,

    /// Invited but has not completed account setup
    Invited,

    /// Deactivated
    Inactive,

    /// Blocked by a company admin
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Invited => "invited",
            UserStatus::Inactive => "inactive",
            UserStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "invited" => Ok(UserStatus::Invited),
            "inactive" => Ok(UserStatus::Inactive),
            "blocked" => Ok(UserStatus::Blocked),
            other => Err(ParseEnumError::new("user status", other)),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account
///
/// Passwords are stored as Argon2id hashes, never in plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,

    /// Lowercased email, unique across all users
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,
    pub status: UserStatus,

    /// Owning company (None only for super admins)
    pub company_id: Option<Uuid>,

    pub phone: Option<String>,

    /// When the user last logged in (None if never logged in)
    pub last_login: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub role: UserRole,
    pub status: UserStatus,
    pub company_id: Option<Uuid>,
}

/// Partial update for an existing user
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserChanges {
    /// Applies the changes to an in-memory user, bumping `updated_at`
    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(first_name) = &self.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(password_hash) = &self.password_hash {
            user.password_hash = password_hash.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(status) = self.status {
            user.status = status;
        }
        if let Some(last_login) = self.last_login {
            user.last_login = Some(last_login);
        }
        user.updated_at = now;
    }
}

/// Filter for listing the users of a company
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring matched case-insensitively against first name, last name and email
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        let search_ok = match self.search.as_deref() {
            Some(search) => {
                contains_ignore_case(&user.first_name, search)
                    || contains_ignore_case(&user.last_name, search)
                    || contains_ignore_case(&user.email, search)
            }
            None => true,
        };

        search_ok
            && self.status.map_or(true, |status| user.status == status)
            && self.role.map_or(true, |role| user.role == role)
    }
}

/// Headcount of a company
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserCounts {
    pub total: i64,
    pub active: i64,
}

impl User {
    /// Display name ("First Last")
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists (unique constraint
    /// `users_email_key`) or the database is unreachable.
    pub async fn create<'e, E>(executor: E, data: &NewUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, role, status, company_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, first_name, last_name, email, password_hash, role, status,
                      company_id, phone, last_login, created_at, updated_at
            "#,
        )
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(data.role)
        .bind(data.status)
        .bind(data.company_id)
        .fetch_one(executor)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, role, status,
                   company_id, phone, last_login, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a user by email (expects a lowercased address)
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, role, status,
                   company_id, phone, last_login, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Finds a user by email within one company
    pub async fn find_by_email_and_company<'e, E>(
        executor: E,
        email: &str,
        company_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, role, status,
                   company_id, phone, last_login, created_at, updated_at
            FROM users
            WHERE email = $1 AND company_id = $2
            "#,
        )
        .bind(email)
        .bind(company_id)
        .fetch_optional(executor)
        .await
    }

    /// Finds the first active admin of a company (oldest account first)
    pub async fn find_company_admin<'e, E>(
        executor: E,
        company_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, role, status,
                   company_id, phone, last_login, created_at, updated_at
            FROM users
            WHERE company_id = $1 AND role = 'admin' AND status = 'active'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .fetch_optional(executor)
        .await
    }

    /// Applies a partial update
    ///
    /// Returns the updated user, or None if no user has this ID.
    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                status = COALESCE($6, status),
                last_login = COALESCE($7, last_login),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, first_name, last_name, email, password_hash, role, status,
                      company_id, phone, last_login, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.password_hash)
        .bind(changes.role)
        .bind(changes.status)
        .bind(changes.last_login)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a user
    ///
    /// Returns true if a row was deleted.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Checks whether any user holds this email
    pub async fn exists_by_email<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(executor)
            .await?;

        Ok(exists.0)
    }

    /// Counts total and active users of a company
    pub async fn count_by_company<'e, E>(
        executor: E,
        company_id: Uuid,
    ) -> Result<UserCounts, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, UserCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'active') AS active
            FROM users
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_one(executor)
        .await
    }

    /// Lists users of a company, newest first
    pub async fn list_by_company(
        conn: &mut PgConnection,
        company_id: Uuid,
        filter: &UserFilter,
        page: Pagination,
    ) -> Result<Paginated<Self>, sqlx::Error> {
        let search = filter.search.as_deref().map(contains_pattern);

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE company_id = $1
              AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
              AND ($3::user_status IS NULL OR status = $3)
              AND ($4::user_role IS NULL OR role = $4)
            "#,
        )
        .bind(company_id)
        .bind(&search)
        .bind(filter.status)
        .bind(filter.role)
        .fetch_one(&mut *conn)
        .await?;

        let items = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, role, status,
                   company_id, phone, last_login, created_at, updated_at
            FROM users
            WHERE company_id = $1
              AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
              AND ($3::user_status IS NULL OR status = $3)
              AND ($4::user_role IS NULL OR role = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(company_id)
        .bind(&search)
        .bind(filter.status)
        .bind(filter.role)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;

        Ok(Paginated {
            items,
            total: total.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@acme.io".to_string(),
            password_hash: "$argon2id$hash".to_string(),
            role: UserRole::Member,
            status: UserStatus::Active,
            company_id: Some(Uuid::new_v4()),
            phone: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [UserRole::Admin, UserRole::Member, UserRole::SuperAdmin] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&UserRole::SuperAdmin).unwrap(),
            "\"super_admin\""
        );
        assert_eq!(serde_json::to_string(&UserStatus::Blocked).unwrap(), "\"blocked\"");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_filter_matches_search_on_any_name_field() {
        let user = sample_user();
        let by_last = UserFilter {
            search: Some("DOE".to_string()),
            ..Default::default()
        };
        let by_email = UserFilter {
            search: Some("acme".to_string()),
            ..Default::default()
        };
        let miss = UserFilter {
            search: Some("smith".to_string()),
            ..Default::default()
        };

        assert!(by_last.matches(&user));
        assert!(by_email.matches(&user));
        assert!(!miss.matches(&user));
    }

    #[test]
    fn test_filter_matches_status_and_role() {
        let user = sample_user();
        let filter = UserFilter {
            status: Some(UserStatus::Active),
            role: Some(UserRole::Admin),
            ..Default::default()
        };
        assert!(!filter.matches(&user));

        let filter = UserFilter {
            status: Some(UserStatus::Active),
            role: Some(UserRole::Member),
            ..Default::default()
        };
        assert!(filter.matches(&user));
    }

    #[test]
    fn test_changes_apply_only_set_fields() {
        let mut user = sample_user();
        let before = user.clone();
        let later = before.updated_at + chrono::Duration::seconds(5);

        UserChanges {
            status: Some(UserStatus::Blocked),
            ..Default::default()
        }
        .apply_to(&mut user, later);

        assert_eq!(user.status, UserStatus::Blocked);
        assert_eq!(user.first_name, before.first_name);
        assert_eq!(user.password_hash, before.password_hash);
        assert_eq!(user.updated_at, later);
    }

    #[test]
    fn test_full_name() {
        assert_eq!(sample_user().full_name(), "Jane Doe");
    }
}
