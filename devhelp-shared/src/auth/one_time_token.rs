/// One-time tokens for invitation and password-reset links
///
/// A token is a random UUID v4 string. The plaintext goes into the emailed
/// link; only its SHA-256 digest is stored, so a database leak does not
/// leak usable links.
///
/// # Example
///
/// ```
/// use devhelp_shared::auth::one_time_token::{generate, hash_token, is_uuid_v4};
///
/// let (token, digest) = generate();
/// assert!(is_uuid_v4(&token));
/// assert_eq!(hash_token(&token), digest);
/// ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a token, returning `(plaintext, digest)`
pub fn generate() -> (String, String) {
    let token = Uuid::new_v4().to_string();
    let digest = hash_token(&token);
    (token, digest)
}

/// Hex SHA-256 of the normalized token
///
/// Tokens are compared lowercased and trimmed, matching how links are
/// re-typed or pasted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(token).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn normalize(token: &str) -> String {
    token.trim().to_lowercase()
}

/// Checks the canonical hyphenated UUID form with version 4
pub fn is_uuid_v4(token: &str) -> bool {
    let token = token.trim();
    // Uuid::parse_str also accepts simple/braced/urn forms; links only carry hyphenated ones
    token.len() == 36
        && Uuid::parse_str(token)
            .map(|uuid| uuid.get_version_num() == 4)
            .unwrap_or(false)
}

/// Short prefix safe to put in logs
pub fn log_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_returns_matching_digest() {
        let (token, digest) = generate();
        assert_eq!(digest.len(), 64);
        assert_eq!(hash_token(&token), digest);
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let (a, _) = generate();
        let (b, _) = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_normalizes_case_and_whitespace() {
        let token = "3F2504E0-4F89-41D3-9A0C-0305E82C3301";
        assert_eq!(
            hash_token(token),
            hash_token(" 3f2504e0-4f89-41d3-9a0c-0305e82c3301\n")
        );
    }

    #[test]
    fn test_is_uuid_v4() {
        assert!(is_uuid_v4(&Uuid::new_v4().to_string()));
        assert!(is_uuid_v4("3f2504e0-4f89-41d3-9a0c-0305e82c3301"));

        // version 1
        assert!(!is_uuid_v4("c232ab00-9414-11ec-b3c8-9f6bdeced846"));
        // simple form
        assert!(!is_uuid_v4("3f2504e04f8941d39a0c0305e82c3301"));
        assert!(!is_uuid_v4("not-a-uuid"));
        assert!(!is_uuid_v4(""));
    }

    #[test]
    fn test_log_prefix() {
        assert_eq!(log_prefix("3f2504e0-4f89"), "3f2504e0");
        assert_eq!(log_prefix("abc"), "abc");
    }
}
