/// Invite model and database operations
///
/// An invite carries a one-time token (stored as a SHA-256 digest) that lets
/// the recipient join a company as a member.
///
/// # State Machine
///
/// ```text
/// pending ──► accepted
///    │
///    ├──────► expired    (lazily, on first access past expires_at)
///    │
///    └──────► cancelled
/// ```
///
/// All three targets are terminal.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE invites (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     role user_role NOT NULL DEFAULT 'member',
///     company_id UUID NOT NULL REFERENCES companies(id),
///     invited_by UUID NOT NULL,
///     status invite_status NOT NULL DEFAULT 'pending',
///     expires_at TIMESTAMPTZ NOT NULL,
///     accepted_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::user::UserRole;
use super::{contains_ignore_case, contains_pattern, Paginated, Pagination, ParseEnumError};

/// How long an invite stays valid
pub fn invite_lifetime() -> Duration {
    Duration::days(7)
}

/// Invite status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invite_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    /// Sent, waiting for the recipient
    Pending,

    /// Recipient created or reactivated their account
    Accepted,

    /// Passed its expiry without being accepted
    Expired,

    /// Withdrawn by the company
    Cancelled,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Expired => "expired",
            InviteStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }

    /// Checks if transition to target status is valid
    pub fn can_transition_to(&self, target: InviteStatus) -> bool {
        matches!(
            (self, target),
            (InviteStatus::Pending, InviteStatus::Accepted)
                | (InviteStatus::Pending, InviteStatus::Expired)
                | (InviteStatus::Pending, InviteStatus::Cancelled)
        )
    }
}

impl FromStr for InviteStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "expired" => Ok(InviteStatus::Expired),
            "cancelled" => Ok(InviteStatus::Cancelled),
            other => Err(ParseEnumError::new("invite status", other)),
        }
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invitation into a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invite {
    pub id: Uuid,

    /// SHA-256 hex digest of the emailed token
    #[serde(skip_serializing)]
    pub token_hash: String,

    /// Lowercased recipient email
    pub email: String,

    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub company_id: Uuid,

    /// User who sent the invite (may since have been deleted)
    pub invited_by: Uuid,

    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    /// True when the invite is still pending but its expiry has passed
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == InviteStatus::Pending && self.expires_at < now
    }

    pub fn matches_search(&self, search: &str) -> bool {
        contains_ignore_case(&self.first_name, search)
            || contains_ignore_case(&self.last_name, search)
            || contains_ignore_case(&self.email, search)
    }
}

/// Input for creating an invite
#[derive(Debug, Clone)]
pub struct NewInvite {
    pub token_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub company_id: Uuid,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Invite {
    pub async fn create<'e, E>(executor: E, data: &NewInvite) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            INSERT INTO invites (token_hash, email, first_name, last_name, role,
                                 company_id, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, token_hash, email, first_name, last_name, role, company_id,
                      invited_by, status, expires_at, accepted_at, created_at, updated_at
            "#,
        )
        .bind(&data.token_hash)
        .bind(&data.email)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(data.role)
        .bind(data.company_id)
        .bind(data.invited_by)
        .bind(data.expires_at)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token_hash, email, first_name, last_name, role, company_id,
                   invited_by, status, expires_at, accepted_at, created_at, updated_at
            FROM invites
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_token_hash<'e, E>(
        executor: E,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token_hash, email, first_name, last_name, role, company_id,
                   invited_by, status, expires_at, accepted_at, created_at, updated_at
            FROM invites
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(executor)
        .await
    }

    /// Finds the most recent pending invite for an email in a company
    pub async fn find_pending_by_email_and_company<'e, E>(
        executor: E,
        email: &str,
        company_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token_hash, email, first_name, last_name, role, company_id,
                   invited_by, status, expires_at, accepted_at, created_at, updated_at
            FROM invites
            WHERE email = $1 AND company_id = $2 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(company_id)
        .fetch_optional(executor)
        .await
    }

    /// Moves a pending invite to `target`
    ///
    /// The update only applies while the invite is still pending, so two
    /// concurrent accepts cannot both succeed. Returns None if the invite
    /// does not exist or has already left `pending`.
    pub async fn transition<'e, E>(
        executor: E,
        id: Uuid,
        target: InviteStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            UPDATE invites
            SET status = $2,
                accepted_at = CASE WHEN $2 = 'accepted'::invite_status THEN $3 ELSE accepted_at END,
                updated_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING id, token_hash, email, first_name, last_name, role, company_id,
                      invited_by, status, expires_at, accepted_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(at)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM invites WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists pending invites of a company, newest first
    pub async fn list_pending_by_company(
        conn: &mut PgConnection,
        company_id: Uuid,
        search: Option<&str>,
        page: Pagination,
    ) -> Result<Paginated<Self>, sqlx::Error> {
        let search = search.map(contains_pattern);

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM invites
            WHERE company_id = $1 AND status = 'pending'
              AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
            "#,
        )
        .bind(company_id)
        .bind(&search)
        .fetch_one(&mut *conn)
        .await?;

        let items = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token_hash, email, first_name, last_name, role, company_id,
                   invited_by, status, expires_at, accepted_at, created_at, updated_at
            FROM invites
            WHERE company_id = $1 AND status = 'pending'
              AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(company_id)
        .bind(&search)
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
