/// Repositories and the unit of work
///
/// Use cases never talk to sqlx directly. They open a [`Session`] from a
/// [`Database`], reach the entity repositories through it, and finish with
/// [`Session::commit`].
///
/// - [`Database::acquire`] always yields an autocommit session: every write
///   is durable as soon as it returns.
/// - [`Database::begin`] yields a transactional session when the backend was
///   built with `use_transactions = true`, and an autocommit one otherwise.
///   The choice is made once at construction time.
///
/// Two backends implement these traits: [`postgres::PgDatabase`] for
/// production and [`memory::MemoryDatabase`] for tests and local runs.
///
/// # Example
///
/// ```no_run
/// use devhelp_shared::store::{Database, StoreResult};
///
/// # async fn example(db: &dyn Database) -> StoreResult<()> {
/// let mut session = db.begin().await?;
/// let exists = session.users().exists_by_email("jane@acme.io").await?;
/// session.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::company::{
    Company, CompanyQuery, CompanyStatus, CompanySummary, NewCompany, PlatformStats,
};
use crate::models::invite::{Invite, InviteStatus, NewInvite};
use crate::models::password_reset::{NewPasswordReset, PasswordReset};
use crate::models::user::{NewUser, User, UserChanges, UserCounts, UserFilter};
use crate::models::{Paginated, Pagination};

/// Unique constraint names shared by both backends
pub mod constraints {
    pub const USERS_EMAIL: &str = "users_email_key";
    pub const COMPANIES_EMAIL: &str = "companies_email_key";
    pub const INVITES_TOKEN: &str = "invites_token_hash_key";
    pub const PASSWORD_RESETS_TOKEN: &str = "password_resets_token_hash_key";
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// Another session changed a row this transaction also changed
    #[error("write conflict on {table}")]
    Conflict { table: &'static str },

    /// The session was already committed or rolled back
    #[error("session is closed")]
    SessionClosed,

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Name of the violated constraint, if this is a unique violation
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserRepository: Send {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Looks up by lowercased email across all companies
    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<User>>;

    /// First active admin of a company
    async fn find_company_admin(&mut self, company_id: Uuid) -> StoreResult<Option<User>>;

    async fn create(&mut self, data: NewUser) -> StoreResult<User>;

    /// Returns None when the user does not exist
    async fn update(&mut self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>>;

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool>;

    async fn count_by_company(&mut self, company_id: Uuid) -> StoreResult<UserCounts>;

    /// Users of a company matching `filter`, newest first
    async fn list_by_company(
        &mut self,
        company_id: Uuid,
        filter: &UserFilter,
        page: Pagination,
    ) -> StoreResult<Paginated<User>>;
}

#[async_trait]
pub trait CompanyRepository: Send {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Company>>;

    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<Company>>;

    async fn create(&mut self, data: NewCompany) -> StoreResult<Company>;

    async fn update_status(
        &mut self,
        id: Uuid,
        status: CompanyStatus,
    ) -> StoreResult<Option<Company>>;

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn count(&mut self) -> StoreResult<i64>;

    async fn list(&mut self, query: &CompanyQuery) -> StoreResult<Paginated<CompanySummary>>;

    async fn platform_stats(&mut self) -> StoreResult<PlatformStats>;
}

#[async_trait]
pub trait InviteRepository: Send {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Invite>>;

    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<Invite>>;

    async fn find_pending_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<Invite>>;

    async fn create(&mut self, data: NewInvite) -> StoreResult<Invite>;

    /// Moves a pending invite to `target`
    ///
    /// Returns None when the invite is missing or no longer pending.
    async fn transition(
        &mut self,
        id: Uuid,
        target: InviteStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Invite>>;

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Pending invites of a company, newest first
    async fn list_pending_by_company(
        &mut self,
        company_id: Uuid,
        search: Option<&str>,
        page: Pagination,
    ) -> StoreResult<Paginated<Invite>>;
}

#[async_trait]
pub trait PasswordResetRepository: Send {
    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<PasswordReset>>;

    async fn create(&mut self, data: NewPasswordReset) -> StoreResult<PasswordReset>;

    /// Returns false when the reset was already used
    async fn mark_used(&mut self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn delete_all_by_user(&mut self, user_id: Uuid) -> StoreResult<u64>;
}

/// Unit of work
///
/// Dropping a transactional session without committing rolls it back.
#[async_trait]
pub trait Session: Send {
    fn users(&mut self) -> &mut dyn UserRepository;
    fn companies(&mut self) -> &mut dyn CompanyRepository;
    fn invites(&mut self) -> &mut dyn InviteRepository;
    fn password_resets(&mut self) -> &mut dyn PasswordResetRepository;

    /// True when writes are buffered until [`Session::commit`]
    fn is_transactional(&self) -> bool;

    /// Makes the writes durable. No-op for autocommit sessions.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discards buffered writes. No-op for autocommit sessions.
    async fn rollback(&mut self) -> StoreResult<()>;
}

/// Entry point to a storage backend
#[async_trait]
pub trait Database: Send + Sync {
    /// Autocommit session
    async fn acquire(&self) -> StoreResult<Box<dyn Session>>;

    /// Transactional session when transactions are enabled, autocommit otherwise
    async fn begin(&self) -> StoreResult<Box<dyn Session>>;

    /// Verifies the backend is reachable
    async fn ping(&self) -> StoreResult<()>;

    fn uses_transactions(&self) -> bool;
}
