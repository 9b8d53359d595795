/// In-memory backend
///
/// Mirrors the PostgreSQL semantics the use cases rely on: unique emails and
/// token digests, pending-only invite transitions, single-use resets, and
/// all-or-nothing transactions. Backs the test suites and `DATABASE_URL=memory`
/// local runs.
///
/// A transactional session works on a private copy of the state. On commit the
/// rows it changed are merged back into the shared state, after re-checking
/// the unique constraints against whatever other sessions wrote meanwhile.
/// Invite and password reset rows are consumed by conditional updates, so a
/// commit that touches one another session changed first is refused with
/// [`StoreError::Conflict`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    constraints, CompanyRepository, Database, InviteRepository, PasswordResetRepository, Session,
    StoreError, StoreResult, UserRepository,
};
use crate::models::company::{
    Company, CompanyQuery, CompanyStatus, CompanySummary, NewCompany, PlatformStats,
    DEFAULT_STORAGE_LIMIT,
};
use crate::models::invite::{Invite, InviteStatus, NewInvite};
use crate::models::password_reset::{NewPasswordReset, PasswordReset};
use crate::models::user::{
    NewUser, User, UserChanges, UserCounts, UserFilter, UserRole, UserStatus,
};
use crate::models::{Paginated, Pagination};

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    companies: HashMap<Uuid, Company>,
    invites: HashMap<Uuid, Invite>,
    password_resets: HashMap<Uuid, PasswordReset>,
}

/// Rows a transaction touched, as the difference between two snapshots
struct Changes<T> {
    upserts: Vec<(Uuid, T)>,
    deletes: Vec<Uuid>,
}

fn diff<T: Clone + PartialEq>(base: &HashMap<Uuid, T>, work: &HashMap<Uuid, T>) -> Changes<T> {
    let upserts = work
        .iter()
        .filter(|(id, row)| base.get(*id) != Some(*row))
        .map(|(id, row)| (*id, row.clone()))
        .collect();
    let deletes = base
        .keys()
        .filter(|id| !work.contains_key(*id))
        .copied()
        .collect();
    Changes { upserts, deletes }
}

/// True when a row `changes` touches no longer matches the snapshot it was read from
fn is_stale<T: PartialEq>(
    current: &HashMap<Uuid, T>,
    base: &HashMap<Uuid, T>,
    changes: &Changes<T>,
) -> bool {
    changes
        .upserts
        .iter()
        .map(|(id, _)| id)
        .chain(changes.deletes.iter())
        .any(|id| current.get(id) != base.get(id))
}

fn merge<T>(target: &mut HashMap<Uuid, T>, changes: Changes<T>) {
    for id in changes.deletes {
        target.remove(&id);
    }
    target.extend(changes.upserts);
}

impl MemoryState {
    fn check_unique(&self) -> StoreResult<()> {
        fn all_distinct<'a>(values: impl Iterator<Item = &'a str>) -> bool {
            let mut seen = std::collections::HashSet::new();
            values.into_iter().all(|v| seen.insert(v))
        }

        if !all_distinct(self.users.values().map(|u| u.email.as_str())) {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }
        if !all_distinct(self.companies.values().map(|c| c.email.as_str())) {
            return Err(StoreError::unique(constraints::COMPANIES_EMAIL));
        }
        if !all_distinct(self.invites.values().map(|i| i.token_hash.as_str())) {
            return Err(StoreError::unique(constraints::INVITES_TOKEN));
        }
        if !all_distinct(self.password_resets.values().map(|r| r.token_hash.as_str())) {
            return Err(StoreError::unique(constraints::PASSWORD_RESETS_TOKEN));
        }
        Ok(())
    }

    /// Applies everything `work` changed relative to `base`
    fn merge_from(&mut self, base: &MemoryState, work: &MemoryState) -> StoreResult<()> {
        let invites = diff(&base.invites, &work.invites);
        if is_stale(&self.invites, &base.invites, &invites) {
            return Err(StoreError::Conflict { table: "invites" });
        }
        let resets = diff(&base.password_resets, &work.password_resets);
        if is_stale(&self.password_resets, &base.password_resets, &resets) {
            return Err(StoreError::Conflict {
                table: "password_resets",
            });
        }

        let mut merged = self.clone();
        merge(&mut merged.users, diff(&base.users, &work.users));
        merge(&mut merged.companies, diff(&base.companies, &work.companies));
        merge(&mut merged.invites, invites);
        merge(&mut merged.password_resets, resets);
        merged.check_unique()?;
        *self = merged;
        Ok(())
    }

    // users

    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn insert_user(&mut self, data: NewUser) -> StoreResult<User> {
        if self.user_by_email(&data.email).is_some() {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            first_name: data.first_name,
            last_name: data.last_name,
            email: data.email,
            password_hash: data.password_hash,
            role: data.role,
            status: data.status,
            company_id: data.company_id,
            phone: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn company_users(&self, company_id: Uuid) -> impl Iterator<Item = &User> {
        self.users
            .values()
            .filter(move |u| u.company_id == Some(company_id))
    }

    // companies

    fn insert_company(&mut self, data: NewCompany) -> StoreResult<Company> {
        if self.companies.values().any(|c| c.email == data.email) {
            return Err(StoreError::unique(constraints::COMPANIES_EMAIL));
        }
        let now = Utc::now();
        let company = Company {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            phone: None,
            website: None,
            address: None,
            status: data.status,
            storage_used: 0,
            storage_limit: DEFAULT_STORAGE_LIMIT,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        };
        self.companies.insert(company.id, company.clone());
        Ok(company)
    }

    fn list_companies(&self, query: &CompanyQuery) -> Paginated<CompanySummary> {
        let mut matching: Vec<&Company> =
            self.companies.values().filter(|c| query.matches(c)).collect();
        matching.sort_by(|a, b| query.compare(a, b).then(a.id.cmp(&b.id)));

        let summaries = matching
            .into_iter()
            .map(|company| CompanySummary {
                company: company.clone(),
                total_users: self.company_users(company.id).count() as i64,
            })
            .collect();
        Paginated::slice(summaries, query.page)
    }

    fn platform_stats(&self) -> PlatformStats {
        let count = |status: CompanyStatus| {
            self.companies.values().filter(|c| c.status == status).count() as i64
        };
        PlatformStats {
            total_companies: self.companies.len() as i64,
            active_companies: count(CompanyStatus::Active),
            inactive_companies: count(CompanyStatus::Inactive),
            suspended_companies: count(CompanyStatus::Suspended),
            trial_companies: count(CompanyStatus::Trial),
            total_users: self.users.len() as i64,
        }
    }

    // invites

    fn insert_invite(&mut self, data: NewInvite) -> StoreResult<Invite> {
        if self.invites.values().any(|i| i.token_hash == data.token_hash) {
            return Err(StoreError::unique(constraints::INVITES_TOKEN));
        }
        let now = Utc::now();
        let invite = Invite {
            id: Uuid::new_v4(),
            token_hash: data.token_hash,
            email: data.email,
            first_name: data.first_name,
            last_name: data.last_name,
            role: data.role,
            company_id: data.company_id,
            invited_by: data.invited_by,
            status: InviteStatus::Pending,
            expires_at: data.expires_at,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    fn transition_invite(
        &mut self,
        id: Uuid,
        target: InviteStatus,
        at: DateTime<Utc>,
    ) -> Option<Invite> {
        let invite = self.invites.get_mut(&id)?;
        if !invite.status.can_transition_to(target) {
            return None;
        }
        invite.status = target;
        if target == InviteStatus::Accepted {
            invite.accepted_at = Some(at);
        }
        invite.updated_at = at;
        Some(invite.clone())
    }

    fn pending_invites(&self, company_id: Uuid, search: Option<&str>) -> Vec<Invite> {
        let mut invites: Vec<Invite> = self
            .invites
            .values()
            .filter(|i| i.company_id == company_id && i.status == InviteStatus::Pending)
            .filter(|i| search.map_or(true, |s| i.matches_search(s)))
            .cloned()
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invites
    }

    // password resets

    fn insert_reset(&mut self, data: NewPasswordReset) -> StoreResult<PasswordReset> {
        if self
            .password_resets
            .values()
            .any(|r| r.token_hash == data.token_hash)
        {
            return Err(StoreError::unique(constraints::PASSWORD_RESETS_TOKEN));
        }
        let now = Utc::now();
        let reset = PasswordReset {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            token_hash: data.token_hash,
            expires_at: data.expires_at,
            is_used: false,
            used_at: None,
            created_at: now,
            updated_at: now,
        };
        self.password_resets.insert(reset.id, reset.clone());
        Ok(reset)
    }
}

/// Shared in-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    use_transactions: bool,
}

impl MemoryDatabase {
    pub fn new(use_transactions: bool) -> Self {
        Self {
            state: Arc::default(),
            use_transactions,
        }
    }

    /// Number of stored password resets (test helper)
    pub fn password_reset_count(&self) -> usize {
        self.state.lock().password_resets.len()
    }

    /// Sets a user's role (test helper for seeding platform operators)
    pub fn set_user_role(&self, user_id: Uuid, role: UserRole) {
        if let Some(user) = self.state.lock().users.get_mut(&user_id) {
            user.role = role;
        }
    }

    /// Overwrites an invite's expiry (test helper for lazy-expiry scenarios)
    pub fn set_invite_expiry(&self, invite_id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(invite) = self.state.lock().invites.get_mut(&invite_id) {
            invite.expires_at = expires_at;
        }
    }

    /// Overwrites a reset's expiry (test helper)
    pub fn set_reset_expiry(&self, reset_id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(reset) = self.state.lock().password_resets.get_mut(&reset_id) {
            reset.expires_at = expires_at;
        }
    }

    /// All password resets of a user (test helper)
    pub fn password_resets_of(&self, user_id: Uuid) -> Vec<PasswordReset> {
        self.state
            .lock()
            .password_resets
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All invites of a company (test helper)
    pub fn invites_of(&self, company_id: Uuid) -> Vec<Invite> {
        self.state
            .lock()
            .invites
            .values()
            .filter(|i| i.company_id == company_id)
            .cloned()
            .collect()
    }

    fn session(&self, transactional: bool) -> MemorySession {
        let mode = if transactional {
            let snapshot = self.state.lock().clone();
            Mode::Transaction {
                base: snapshot.clone(),
                work: snapshot,
            }
        } else {
            Mode::Autocommit
        };
        MemorySession {
            shared: Arc::clone(&self.state),
            mode: Some(mode),
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn acquire(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(self.session(false)))
    }

    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(self.session(self.use_transactions)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn uses_transactions(&self) -> bool {
        self.use_transactions
    }
}

enum Mode {
    Autocommit,
    Transaction { base: MemoryState, work: MemoryState },
}

pub struct MemorySession {
    shared: Arc<Mutex<MemoryState>>,
    mode: Option<Mode>,
}

impl MemorySession {
    /// Runs `f` against the state this session reads and writes
    fn with_state<R>(&mut self, f: impl FnOnce(&mut MemoryState) -> StoreResult<R>) -> StoreResult<R> {
        match self.mode.as_mut() {
            Some(Mode::Autocommit) => f(&mut *self.shared.lock()),
            Some(Mode::Transaction { work, .. }) => f(work),
            None => Err(StoreError::SessionClosed),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
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
        matches!(self.mode, Some(Mode::Transaction { .. }))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        match self.mode.take() {
            Some(Mode::Transaction { base, work }) => self.shared.lock().merge_from(&base, &work),
            Some(Mode::Autocommit) => {
                self.mode = Some(Mode::Autocommit);
                Ok(())
            }
            None => Err(StoreError::SessionClosed),
        }
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        match self.mode.take() {
            Some(Mode::Transaction { .. }) => Ok(()),
            Some(Mode::Autocommit) => {
                self.mode = Some(Mode::Autocommit);
                Ok(())
            }
            None => Err(StoreError::SessionClosed),
        }
    }
}

#[async_trait]
impl UserRepository for MemorySession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.with_state(|s| Ok(s.users.get(&id).cloned()))
    }

    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.with_state(|s| Ok(s.user_by_email(email).cloned()))
    }

    async fn find_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<User>> {
        self.with_state(|s| {
            Ok(s
                .user_by_email(email)
                .filter(|u| u.company_id == Some(company_id))
                .cloned())
        })
    }

    async fn find_company_admin(&mut self, company_id: Uuid) -> StoreResult<Option<User>> {
        self.with_state(|s| {
            Ok(s.company_users(company_id)
                .filter(|u| u.role == UserRole::Admin && u.status == UserStatus::Active)
                .min_by_key(|u| u.created_at)
                .cloned())
        })
    }

    async fn create(&mut self, data: NewUser) -> StoreResult<User> {
        self.with_state(|s| s.insert_user(data))
    }

    async fn update(&mut self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        self.with_state(|s| {
            Ok(s.users.get_mut(&id).map(|user| {
                changes.apply_to(user, Utc::now());
                user.clone()
            }))
        })
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        self.with_state(|s| Ok(s.users.remove(&id).is_some()))
    }

    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool> {
        self.with_state(|s| Ok(s.user_by_email(email).is_some()))
    }

    async fn count_by_company(&mut self, company_id: Uuid) -> StoreResult<UserCounts> {
        self.with_state(|s| {
            let (total, active) = s.company_users(company_id).fold((0, 0), |(t, a), u| {
                (t + 1, a + i64::from(u.status == UserStatus::Active))
            });
            Ok(UserCounts { total, active })
        })
    }

    async fn list_by_company(
        &mut self,
        company_id: Uuid,
        filter: &UserFilter,
        page: Pagination,
    ) -> StoreResult<Paginated<User>> {
        self.with_state(|s| {
            let mut users: Vec<User> = s
                .company_users(company_id)
                .filter(|u| filter.matches(u))
                .cloned()
                .collect();
            users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(Paginated::slice(users, page))
        })
    }
}

#[async_trait]
impl CompanyRepository for MemorySession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Company>> {
        self.with_state(|s| Ok(s.companies.get(&id).cloned()))
    }

    async fn find_by_email(&mut self, email: &str) -> StoreResult<Option<Company>> {
        self.with_state(|s| Ok(s.companies.values().find(|c| c.email == email).cloned()))
    }

    async fn create(&mut self, data: NewCompany) -> StoreResult<Company> {
        self.with_state(|s| s.insert_company(data))
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: CompanyStatus,
    ) -> StoreResult<Option<Company>> {
        self.with_state(|s| {
            Ok(s.companies.get_mut(&id).map(|company| {
                company.status = status;
                company.updated_at = Utc::now();
                company.clone()
            }))
        })
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        self.with_state(|s| Ok(s.companies.remove(&id).is_some()))
    }

    async fn count(&mut self) -> StoreResult<i64> {
        self.with_state(|s| Ok(s.companies.len() as i64))
    }

    async fn list(&mut self, query: &CompanyQuery) -> StoreResult<Paginated<CompanySummary>> {
        self.with_state(|s| Ok(s.list_companies(query)))
    }

    async fn platform_stats(&mut self) -> StoreResult<PlatformStats> {
        self.with_state(|s| Ok(s.platform_stats()))
    }
}

#[async_trait]
impl InviteRepository for MemorySession {
    async fn find_by_id(&mut self, id: Uuid) -> StoreResult<Option<Invite>> {
        self.with_state(|s| Ok(s.invites.get(&id).cloned()))
    }

    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<Invite>> {
        self.with_state(|s| {
            Ok(s.invites
                .values()
                .find(|i| i.token_hash == token_hash)
                .cloned())
        })
    }

    async fn find_pending_by_email_and_company(
        &mut self,
        email: &str,
        company_id: Uuid,
    ) -> StoreResult<Option<Invite>> {
        self.with_state(|s| {
            Ok(s.invites
                .values()
                .filter(|i| {
                    i.email == email
                        && i.company_id == company_id
                        && i.status == InviteStatus::Pending
                })
                .max_by_key(|i| i.created_at)
                .cloned())
        })
    }

    async fn create(&mut self, data: NewInvite) -> StoreResult<Invite> {
        self.with_state(|s| s.insert_invite(data))
    }

    async fn transition(
        &mut self,
        id: Uuid,
        target: InviteStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Invite>> {
        self.with_state(|s| Ok(s.transition_invite(id, target, at)))
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        self.with_state(|s| Ok(s.invites.remove(&id).is_some()))
    }

    async fn list_pending_by_company(
        &mut self,
        company_id: Uuid,
        search: Option<&str>,
        page: Pagination,
    ) -> StoreResult<Paginated<Invite>> {
        self.with_state(|s| Ok(Paginated::slice(s.pending_invites(company_id, search), page)))
    }
}

#[async_trait]
impl PasswordResetRepository for MemorySession {
    async fn find_by_token_hash(&mut self, token_hash: &str) -> StoreResult<Option<PasswordReset>> {
        self.with_state(|s| {
            Ok(s.password_resets
                .values()
                .find(|r| r.token_hash == token_hash)
                .cloned())
        })
    }

    async fn create(&mut self, data: NewPasswordReset) -> StoreResult<PasswordReset> {
        self.with_state(|s| s.insert_reset(data))
    }

    async fn mark_used(&mut self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        self.with_state(|s| match s.password_resets.get_mut(&id) {
            Some(reset) if !reset.is_used => {
                reset.is_used = true;
                reset.used_at = Some(at);
                reset.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn delete_all_by_user(&mut self, user_id: Uuid) -> StoreResult<u64> {
        self.with_state(|s| {
            let before = s.password_resets.len();
            s.password_resets.retain(|_, r| r.user_id != user_id);
            Ok((before - s.password_resets.len()) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_company(email: &str) -> NewCompany {
        NewCompany {
            name: "Acme".to_string(),
            email: email.to_string(),
            status: CompanyStatus::Active,
        }
    }

    fn new_user(email: &str, company_id: Uuid) -> NewUser {
        NewUser {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Admin,
            status: UserStatus::Active,
            company_id: Some(company_id),
        }
    }

    #[tokio::test]
    async fn test_unique_user_email() {
        let db = MemoryDatabase::new(true);
        let mut session = db.acquire().await.unwrap();
        let company = session.companies().create(new_company("a@acme.io")).await.unwrap();

        session.users().create(new_user("jane@acme.io", company.id)).await.unwrap();
        let err = session
            .users()
            .create(new_user("jane@acme.io", company.id))
            .await
            .unwrap_err();

        assert_eq!(err.violated_constraint(), Some(constraints::USERS_EMAIL));
    }

    #[tokio::test]
    async fn test_transaction_is_invisible_until_commit() {
        let db = MemoryDatabase::new(true);
        let mut tx = db.begin().await.unwrap();
        assert!(tx.is_transactional());
        tx.companies().create(new_company("a@acme.io")).await.unwrap();

        let mut reader = db.acquire().await.unwrap();
        assert_eq!(reader.companies().count().await.unwrap(), 0);

        tx.commit().await.unwrap();
        assert_eq!(reader.companies().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = MemoryDatabase::new(true);
        let mut tx = db.begin().await.unwrap();
        tx.companies().create(new_company("a@acme.io")).await.unwrap();
        tx.rollback().await.unwrap();

        let mut reader = db.acquire().await.unwrap();
        assert_eq!(reader.companies().count().await.unwrap(), 0);
        assert!(matches!(
            tx.companies().count().await,
            Err(StoreError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_transaction_writes_nothing() {
        let db = MemoryDatabase::new(true);
        {
            let mut tx = db.begin().await.unwrap();
            tx.companies().create(new_company("a@acme.io")).await.unwrap();
        }
        let mut reader = db.acquire().await.unwrap();
        assert_eq!(reader.companies().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_begin_without_transactions_is_autocommit() {
        let db = MemoryDatabase::new(false);
        let mut session = db.begin().await.unwrap();
        assert!(!session.is_transactional());
        session.companies().create(new_company("a@acme.io")).await.unwrap();

        let mut reader = db.acquire().await.unwrap();
        assert_eq!(reader.companies().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_rechecks_unique_constraints() {
        let db = MemoryDatabase::new(true);
        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();

        first.companies().create(new_company("dup@acme.io")).await.unwrap();
        second.companies().create(new_company("dup@acme.io")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(err.violated_constraint(), Some(constraints::COMPANIES_EMAIL));
    }

    #[tokio::test]
    async fn test_commit_keeps_concurrent_autocommit_writes() {
        let db = MemoryDatabase::new(true);
        let mut tx = db.begin().await.unwrap();
        tx.companies().create(new_company("tx@acme.io")).await.unwrap();

        let mut other = db.acquire().await.unwrap();
        other.companies().create(new_company("other@acme.io")).await.unwrap();

        tx.commit().await.unwrap();
        assert_eq!(other.companies().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invite_transition_only_from_pending() {
        let db = MemoryDatabase::new(true);
        let mut session = db.acquire().await.unwrap();
        let company = session.companies().create(new_company("a@acme.io")).await.unwrap();
        let invite = session
            .invites()
            .create(NewInvite {
                token_hash: "h1".to_string(),
                email: "x@acme.io".to_string(),
                first_name: "X".to_string(),
                last_name: "Y".to_string(),
                role: UserRole::Member,
                company_id: company.id,
                invited_by: Uuid::new_v4(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        let now = Utc::now();
        let accepted = session
            .invites()
            .transition(invite.id, InviteStatus::Accepted, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.accepted_at, Some(now));

        let again = session
            .invites()
            .transition(invite.id, InviteStatus::Accepted, now)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_mark_used_is_single_shot() {
        let db = MemoryDatabase::new(true);
        let mut session = db.acquire().await.unwrap();
        let reset = session
            .password_resets()
            .create(NewPasswordReset {
                user_id: Uuid::new_v4(),
                token_hash: "h".to_string(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(session.password_resets().mark_used(reset.id, Utc::now()).await.unwrap());
        assert!(!session.password_resets().mark_used(reset.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_interleaved_mark_used_commits_once() {
        let db = MemoryDatabase::new(true);
        let reset = db
            .acquire()
            .await
            .unwrap()
            .password_resets()
            .create(NewPasswordReset {
                user_id: Uuid::new_v4(),
                token_hash: "h".to_string(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();
        assert!(first.password_resets().mark_used(reset.id, Utc::now()).await.unwrap());
        assert!(second.password_resets().mark_used(reset.id, Utc::now()).await.unwrap());

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(db.password_resets_of(reset.user_id).len(), 1);
    }

    #[tokio::test]
    async fn test_interleaved_invite_accepts_commit_once() {
        let db = MemoryDatabase::new(true);
        let mut setup = db.acquire().await.unwrap();
        let company = setup.companies().create(new_company("a@acme.io")).await.unwrap();
        let invite = setup
            .invites()
            .create(NewInvite {
                token_hash: "h1".to_string(),
                email: "x@acme.io".to_string(),
                first_name: "X".to_string(),
                last_name: "Y".to_string(),
                role: UserRole::Member,
                company_id: company.id,
                invited_by: Uuid::new_v4(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();
        for tx in [&mut first, &mut second] {
            let accepted = tx
                .invites()
                .transition(invite.id, InviteStatus::Accepted, Utc::now())
                .await
                .unwrap();
            assert!(accepted.is_some());
        }

        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_untouched_rows_do_not_conflict() {
        let db = MemoryDatabase::new(true);
        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();

        first.companies().create(new_company("one@acme.io")).await.unwrap();
        second
            .password_resets()
            .create(NewPasswordReset {
                user_id: Uuid::new_v4(),
                token_hash: "h".to_string(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_company_admin_is_first_active_admin() {
        let db = MemoryDatabase::new(false);
        let mut session = db.acquire().await.unwrap();
        let company = session.companies().create(new_company("a@acme.io")).await.unwrap();

        let mut member = new_user("member@acme.io", company.id);
        member.role = UserRole::Member;
        session.users().create(member).await.unwrap();
        let admin = session.users().create(new_user("admin@acme.io", company.id)).await.unwrap();

        let found = session.users().find_company_admin(company.id).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(admin.id));
    }
}
