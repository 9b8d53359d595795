/// Authentication and authorization primitives
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and the password policy
/// - [`jwt`]: Access/refresh token issuance and verification
/// - [`one_time_token`]: Invite and reset link tokens (stored as SHA-256 digests)
/// - [`middleware`]: Bearer header parsing into an [`middleware::AuthContext`]
/// - [`authorization`]: Role guards, permission sets, redirects

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod one_time_token;
pub mod password;
