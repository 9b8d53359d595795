/// Super-admin provisioning at startup

use tracing::{info, warn};

use super::{normalize_email, Services};
use crate::error::AppResult;
use crate::models::user::{NewUser, UserChanges, UserRole, UserStatus};

/// What [`seed_super_admin`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    Updated,
    /// The email belongs to a non-super-admin account, which was left alone
    Skipped,
}

/// Creates the configured super admin, or refreshes its password and
/// reactivates it when it already exists
pub async fn seed_super_admin(services: &Services, email: &str, password: &str) -> AppResult<SeedOutcome> {
    let email = normalize_email(email);
    let password_hash = services.passwords.hash(password).await?;

    let mut session = services.db.begin().await?;

    let outcome = match session.users().find_by_email(&email).await? {
        Some(user) if user.role == UserRole::SuperAdmin => {
            session
                .users()
                .update(
                    user.id,
                    UserChanges {
                        password_hash: Some(password_hash),
                        status: Some(UserStatus::Active),
                        ..Default::default()
                    },
                )
                .await?;
            info!(user_id = %user.id, email = %email, "Super admin updated");
            SeedOutcome::Updated
        }
        Some(user) => {
            warn!(
                user_id = %user.id,
                email = %email,
                role = %user.role,
                "Super admin email belongs to another account; not seeding"
            );
            SeedOutcome::Skipped
        }
        None => {
            let user = session
                .users()
                .create(NewUser {
                    first_name: "Super".to_string(),
                    last_name: "Admin".to_string(),
                    email: email.clone(),
                    password_hash,
                    role: UserRole::SuperAdmin,
                    status: UserStatus::Active,
                    company_id: None,
                })
                .await?;
            info!(user_id = %user.id, email = %email, "Super admin created");
            SeedOutcome::Created
        }
    };

    session.commit().await?;
    Ok(outcome)
}
