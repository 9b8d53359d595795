/// PostgreSQL backend
///
/// Each session owns either a pooled connection (autocommit) or an open
/// transaction. The SQL itself lives on the model types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{
    CompanyRepository, Database, InviteRepository, PasswordResetRepository, Session, StoreError,
    StoreResult, UserRepository,
};
use crate::models::company::{
    Company, CompanyQuery, CompanyStatus, CompanySummary, NewCompany, PlatformStats,
};
use crate::models::invite::{Invite, InviteStatus, NewInvite};
use crate::models::password_reset::{NewPasswordReset, PasswordReset};
use crate::models::user::{NewUser, User, UserChanges, UserCounts, UserFilter};
use crate::models::{Paginated, Pagination};

/// Database handle over a sqlx pool
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
    use_transactions: bool,
}

impl PgDatabase {
    pub fn new(pool: PgPool, use_transactions: bool) -> Self {
        Self {
            pool,
            use_transactions,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn acquire(&self) -> StoreResult<Box<dyn Session>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession {
            inner: Some(PgConn::Pooled(conn)),
        }))
    }

    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        if !self.use_transactions {
            return self.acquire().await;
        }

        let tx = self.pool.begin().await?;
        debug!("Transaction started");
        Ok(Box::new(PgSession {
            inner: Some(PgConn::Tx(tx)),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::db::pool::health_check(&self.pool).await?;
        Ok(())
    }

    fn uses_transactions(&self) -> bool {
        self.use_transactions
    }
}

enum PgConn {
    Tx(Transaction<'static, Postgres>),
    Pooled(PoolConnection<Postgres>),
}

/// Session over one connection
///
/// An uncommitted transaction is rolled back when the session is dropped.
pub struct PgSession {
    inner: Option<PgConn>,
}

impl PgSession {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        match self.inner.as_mut() {
            Some(PgConn::Tx(tx)) => Ok(&mut **tx),
            Some(PgConn::Pooled(conn)) => Ok(&mut **conn),
            None => Err(StoreError::SessionClosed),
        }
    }
}

#[async_trait]
impl Session for PgSession {
    fn users(&mut self) -> &mut dyn UserRepository {
        self
    }

    fn companies(&mut self) -> &mut dyn CompanyRepository {
        self
    }

    fn invites(&mut self) -> &mut dyn InviteRepository {
        self
    }

    fn password_resets(&mut self) -> &mut dyn PasswordResetRepository {
        self
    }

    fn is_transactional(&self) -> bool {
        matches!(self.inner, Some(PgConn::Tx(_)))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        match self.inner.take() {
            Some(PgConn::Tx(tx)) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(())
            }
            Some(pooled) => {
                self.inner = Some(pooled);
                Ok(())
            }
            None => Err(StoreError::SessionClosed),
        }
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        match self.inner.take() {
            Some(PgConn::Tx(tx)) => {
                tx.rollback().await?;
                debug!("Transaction rolled back");
                Ok(())
            }
            Some(pooled) => {
                self.inner = Some(pooled);
                Ok(())
            }
            None => Err(StoreError::SessionClosed),
        }
    }
}

#[async_trait]
impl UserRepository for PgSession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(self.conn()?, id).await?)
    }

    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(self.conn()?, email).await?)
    }

    async fn find_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<User>> {
        Ok(User::find_by_email_and_company(self.conn()?, email, company_id).await?)
    }

    async fn find_company_admin(&mut self, company_id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_company_admin(self.conn()?, company_id).await?)
    }

    async fn create(&mut self, data: NewUser) -> StoreResult<User> {
        Ok(User::create(self.conn()?, &data).await?)
    }

    async fn update(&mut self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        Ok(User::update(self.conn()?, id, &changes).await?)
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(User::delete(self.conn()?, id).await?)
    }

    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool> {
        Ok(User::exists_by_email(self.conn()?, email).await?)
    }

    async fn count_by_company(&mut self, company_id: Uuid) -> StoreResult<UserCounts> {
        Ok(User::count_by_company(self.conn()?, company_id).await?)
    }

    async fn list_by_company(
        &mut self,
        company_id: Uuid,
        filter: &UserFilter,
        page: Pagination,
    ) -> StoreResult<Paginated<User>> {
        Ok(User::list_by_company(self.conn()?, company_id, filter, page).await?)
    }
}

#[async_trait]
impl CompanyRepository for PgSession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Company>> {
        Ok(Company::find_by_id(self.conn()?, id).await?)
    }

    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<Company>> {
        Ok(Company::find_by_email(self.conn()?, email).await?)
    }

    async fn create(&mut self, data: NewCompany) -> StoreResult<Company> {
        Ok(Company::create(self.conn()?, &data).await?)
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: CompanyStatus,
    ) -> StoreResult<Option<Company>> {
        Ok(Company::update_status(self.conn()?, id, status).await?)
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Company::delete(self.conn()?, id).await?)
    }

    async fn count(&mut self) -> StoreResult<i64> {
        Ok(Company::count(self.conn()?).await?)
    }

    async fn list(&mut self, query: &CompanyQuery) -> StoreResult<Paginated<CompanySummary>> {
        Ok(Company::list(self.conn()?, query).await?)
    }

    async fn platform_stats(&mut self) -> StoreResult<PlatformStats> {
        Ok(Company::platform_stats(self.conn()?).await?)
    }
}

#[async_trait]
impl InviteRepository for PgSession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Invite>> {
        Ok(Invite::find_by_id(self.conn()?, id).await?)
    }

    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<Invite>> {
        Ok(Invite::find_by_token_hash(self.conn()?, token_hash).await?)
    }

    async fn find_pending_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<Invite>> {
        Ok(Invite::find_pending_by_email_and_company(self.conn()?, email, company_id).await?)
    }

    async fn create(&mut self, data: NewInvite) -> StoreResult<Invite> {
        Ok(Invite::create(self.conn()?, &data).await?)
    }

    async fn transition(
        &mut self,
        id: Uuid,
        target: InviteStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Invite>> {
        Ok(Invite::transition(self.conn()?, id, target, at).await?)
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Invite::delete(self.conn()?, id).await?)
    }

    async fn list_pending_by_company(
        &mut self,
        company_id: Uuid,
        search: Option<&str>,
        page: Pagination,
    ) -> StoreResult<Paginated<Invite>> {
        Ok(Invite::list_pending_by_company(self.conn()?, company_id, search, page).await?)
    }
}

#[async_trait]
impl PasswordResetRepository for PgSession {
    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<PasswordReset>> {
        Ok(PasswordReset::find_by_token_hash(self.conn()?, token_hash).await?)
    }

    async fn create(&mut self, data: NewPasswordReset) -> StoreResult<PasswordReset> {
        Ok(PasswordReset::create(self.conn()?, &data).await?)
    }

    async fn mark_used(&mut self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(PasswordReset::mark_used(self.conn()?, id, at).await?)
    }

    async fn delete_all_by_user(&mut self, user_id: Uuid) -> StoreResult<u64> {
        Ok(PasswordReset::delete_all_by_user(self.conn()?, user_id).await?)
    }
}
