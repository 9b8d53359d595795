/// Password reset token model
///
/// Stores the SHA-256 digest of a one-time token emailed to the user.
/// A user has at most one outstanding reset: requesting a new one purges
/// the old ones first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// How long a reset link stays valid
pub fn reset_lifetime() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordReset {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Input for creating a reset
#[derive(Debug, Clone)]
pub struct NewPasswordReset {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    pub async fn create<'e, E>(executor: E, data: &NewPasswordReset) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            INSERT INTO password_resets (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, is_used, used_at, created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(&data.token_hash)
        .bind(data.expires_at)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_token_hash<'e, E>(
        executor: E,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            SELECT id, user_id, token_hash, expires_at, is_used, used_at, created_at, updated_at
            FROM password_resets
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(executor)
        .await
    }

    /// Marks a reset as used
    ///
    /// Returns false if it was already used (or does not exist), which makes
    /// the token single-use even under concurrent submissions.
    pub async fn mark_used<'e, E>(
        executor: E,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE password_resets
            SET is_used = TRUE, used_at = $2, updated_at = $2
            WHERE id = $1 AND is_used = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every reset belonging to a user
    pub async fn delete_all_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM password_resets WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let reset = PasswordReset {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: String::new(),
            expires_at: now + reset_lifetime(),
            is_used: false,
            used_at: None,
            created_at: now,
            updated_at: now,
        };

        assert!(!reset.is_expired(now));
        assert!(reset.is_expired(now + Duration::hours(2)));
    }
}
