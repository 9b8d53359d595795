/// Password hashing and password policy
///
/// Hashes are Argon2id PHC strings. The default cost is 64 MiB of memory,
/// 3 passes and 4 lanes with a 32-byte output; [`HashCost`] lets tests and
/// small deployments dial it down.
///
/// # Example
///
/// ```
/// use devhelp_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Str0ng!Pass")?;
/// assert!(verify_password("Str0ng!Pass", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use std::borrow::Cow;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};
use validator::ValidationError;

/// Characters that satisfy the "special character" rule
pub const SPECIAL_CHARACTERS: &str = "@$!%*?&";

pub const PASSWORD_MIN_LENGTH: u64 = 8;
pub const PASSWORD_MAX_LENGTH: u64 = 120;

pub const PASSWORD_POLICY_MESSAGE: &str = "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character";

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl HashCost {
    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(32)
            .build()
            .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hashes with an explicit cost
pub fn hash_password_with(password: &str, cost: HashCost) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = cost
        .argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Hashes with the default cost
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with(password, HashCost::default())
}

/// Verifies a password against a PHC hash (constant-time)
///
/// The cost parameters are read from the hash itself.
///
/// # Returns
///
/// `Ok(true)` on match, `Ok(false)` on mismatch
///
/// # Errors
///
/// Returns `PasswordError::InvalidHash` if the stored hash cannot be parsed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// Hashing service used by the use cases
///
/// Argon2 is deliberately slow, so the work runs on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordService {
    cost: HashCost,
}

impl PasswordService {
    pub fn new(cost: HashCost) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> HashCost {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash_password_with(&password, cost))
            .await
            .map_err(|e| PasswordError::HashError(format!("Hashing task failed: {}", e)))?
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| PasswordError::VerifyError(format!("Verification task failed: {}", e)))?
    }
}

/// Composition rule for new passwords
///
/// Requires a lowercase letter, an uppercase letter, a digit and one of
/// [`SPECIAL_CHARACTERS`]. Length is checked separately by the request
/// validators.
pub fn validate_password_policy(password: &str) -> Result<(), ValidationError> {
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    if has_lower && has_upper && has_digit && has_special {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_policy");
        err.message = Some(Cow::Borrowed(PASSWORD_POLICY_MESSAGE));
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HashCost {
        HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_default_cost_parameters() {
        let hash = hash_password("test_password_123").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_custom_cost_is_embedded_in_hash() {
        let hash = hash_password_with("pw", cheap()).unwrap();
        assert!(hash.contains("m=1024,t=1,p=1"));
        assert!(verify_password("pw", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let hash1 = hash_password_with("same_password", cheap()).unwrap();
        let hash2 = hash_password_with("same_password", cheap()).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_mismatch_is_false_not_error() {
        let hash = hash_password_with("correct_password", cheap()).unwrap();
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash() {
        assert!(verify_password("password", "invalid_hash").is_err());
        assert!(verify_password("password", "$argon2id$invalid").is_err());
    }

    #[tokio::test]
    async fn test_service_hash_and_verify() {
        let service = PasswordService::new(cheap());
        let hash = service.hash("Str0ng!Pass").await.unwrap();

        assert!(service.verify("Str0ng!Pass", &hash).await.unwrap());
        assert!(!service.verify("Str0ng!Pas", &hash).await.unwrap());
    }

    #[test]
    fn test_policy_accepts_compliant_passwords() {
        for password in ["MyP@ssw0rd", "Str0ng!Pass", "C0mpl3x&Pwd", "S3cur3$Password"] {
            assert!(validate_password_policy(password).is_ok(), "{password}");
        }
    }

    #[test]
    fn test_policy_rejects_missing_classes() {
        for password in ["lowercase1!", "UPPERCASE1!", "NoDigits!!", "NoSpecial123"] {
            let err = validate_password_policy(password).unwrap_err();
            assert_eq!(err.code, "password_policy");
            assert_eq!(err.message.as_deref(), Some(PASSWORD_POLICY_MESSAGE));
        }
    }

    #[test]
    fn test_policy_special_characters_are_the_fixed_set() {
        // '#' is not in the accepted set
        assert!(validate_password_policy("Passw0rd#").is_err());
        assert!(validate_password_policy("Passw0rd#?").is_ok());
    }
}
