/// JWT token generation and validation
///
/// Access and refresh tokens are both HS256 JWTs, but each kind is signed
/// with its own secret and carries a `token_type` claim, so one can never be
/// replayed as the other.
///
/// # Token Types
///
/// - **Access Token**: Short-lived (15 min by default), sent as `Authorization: Bearer`
/// - **Refresh Token**: Long-lived (7 days by default), delivered in an httpOnly cookie
///
/// # Example
///
/// ```
/// use devhelp_shared::auth::jwt::{TokenConfig, TokenService, TokenSubject};
/// use devhelp_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tokens = TokenService::new(TokenConfig {
///     access_secret: "access-secret-that-is-at-least-32-bytes".to_string(),
///     refresh_secret: "refresh-secret-that-is-at-least-32-bytes".to_string(),
///     access_ttl: chrono::Duration::minutes(15),
///     refresh_ttl: chrono::Duration::days(7),
/// });
///
/// let subject = TokenSubject {
///     user_id: Uuid::new_v4(),
///     email: "jane@acme.io".to_string(),
///     role: UserRole::Admin,
///     company_id: Some(Uuid::new_v4()),
/// };
///
/// let pair = tokens.generate_token_pair(&subject)?;
/// let claims = tokens.verify_access_token(&pair.access_token)?;
/// assert_eq!(claims.sub, subject.user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{User, UserRole};

/// Issuer claim stamped on every token
pub const ISSUER: &str = "devhelp";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, format or claim validation failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Invalid issuer
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Token is valid but of the other kind
    #[error("Expected {expected:?} token, got {actual:?}")]
    WrongTokenType {
        expected: TokenType,
        actual: TokenType,
    },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
///
/// # Standard Claims
///
/// - `sub`: User ID
/// - `iss`: Always "devhelp"
/// - `iat` / `nbf` / `exp`: Unix timestamps
///
/// # Custom Claims
///
/// - `email`, `role`: Snapshot of the user at issue time
/// - `company_id`: Tenant context (absent for super admins)
/// - `token_type`: Access or refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,

    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

/// Identity a token is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

impl From<&User> for TokenSubject {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            company_id: user.company_id,
        }
    }
}

impl Claims {
    /// Creates claims valid from now for `expires_in`
    pub fn new(subject: &TokenSubject, token_type: TokenType, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            company_id: subject.company_id,
            token_type,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates signature, issuer, `exp` and `nbf`, then returns the claims
///
/// Expiry gets its own variant so callers can tell the client to refresh.
/// No clock-skew leeway: a token is rejected from its `exp` second on.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Secrets and lifetimes for [`TokenService`]
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Access/refresh pair handed out on login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    pub token_type: &'static str,
}

/// Issues and verifies tokens with the configured secrets
#[derive(Debug, Clone)]
pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    pub fn generate_access_token(&self, subject: &TokenSubject) -> Result<String, JwtError> {
        let claims = Claims::new(subject, TokenType::Access, self.config.access_ttl);
        create_token(&claims, &self.config.access_secret)
    }

    pub fn generate_refresh_token(&self, subject: &TokenSubject) -> Result<String, JwtError> {
        let claims = Claims::new(subject, TokenType::Refresh, self.config.refresh_ttl);
        create_token(&claims, &self.config.refresh_secret)
    }

    pub fn generate_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.generate_access_token(subject)?,
            refresh_token: self.generate_refresh_token(subject)?,
            expires_in: self.config.access_ttl.num_seconds(),
            token_type: "Bearer",
        })
    }

    /// Verifies an access token
    ///
    /// # Errors
    ///
    /// - `JwtError::Expired` if the token is past `exp`
    /// - `JwtError::WrongTokenType` if a refresh token was presented
    /// - `JwtError::ValidationError` for anything else
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        verify_kind(token, &self.config.access_secret, TokenType::Access)
    }

    /// Verifies a refresh token (same error contract as [`Self::verify_access_token`])
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        verify_kind(token, &self.config.refresh_secret, TokenType::Refresh)
    }
}

fn verify_kind(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected,
            actual: claims.token_type,
        });
    }

    Ok(claims)
}
