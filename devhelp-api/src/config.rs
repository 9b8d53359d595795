/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. Invalid values fail fast at startup.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string, or `memory` (required)
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080, `PORT` accepted)
/// - `APP_ENV`: development | production | test (default: development)
/// - `JWT_SECRET` / `JWT_REFRESH_SECRET`: Signing keys (required, 32+ chars, distinct)
/// - `FRONTEND_URL`: Base URL for emailed links (default: http://localhost:5173)
/// - `SUPER_ADMIN_EMAIL` / `SUPER_ADMIN_PASSWORD`: Seeded at startup when both set
/// - `MAIL_API_URL` / `MAIL_API_KEY`: Mail relay; logs mail when unset
/// - `LOG_FORMAT`: pretty | json (default: pretty)
///
/// # Example
///
/// ```no_run
/// use devhelp_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::Duration;
use devhelp_shared::auth::jwt::TokenConfig;
use devhelp_shared::auth::password::HashCost;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub password: HashCost,
    pub mail: MailConfig,

    /// Account seeded at startup
    pub super_admin: Option<SuperAdminConfig>,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => bail!("APP_ENV must be development, production or test, got {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,

    /// Base URL of the web app, without trailing slash
    pub frontend_url: String,

    /// Allowed CORS origins; `*` switches to permissive CORS
    pub cors_origins: Vec<String>,

    /// Whether `X-Forwarded-For` identifies the client for rate limiting
    pub trust_proxy: bool,

    pub log_format: LogFormat,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL, or `memory` for the in-memory backend
    pub url: String,

    pub max_connections: u32,

    /// Whether units of work run inside real transactions
    pub use_transactions: bool,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Access-token signing key
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Refresh-token signing key; must differ from `secret`
    pub refresh_secret: String,

    pub expires_in: Duration,
    pub refresh_expires_in: Duration,

    /// Refresh cookie lifetime when the user asks to be remembered
    pub remember_me_expires_in: Duration,
}

impl JwtConfig {
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_secret: self.secret.clone(),
            refresh_secret: self.refresh_secret.clone(),
            access_ttl: self.expires_in,
            refresh_ttl: self.refresh_expires_in,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,

    /// Relay endpoint; mail is only logged when unset
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct SuperAdminConfig {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SuperAdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperAdminConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Environment lookup; split out so tests can feed a map
struct Vars<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Value of `key`, with blank treated as unset
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .with_context(|| format!("{key} environment variable is required"))
    }

    fn parse<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} has an invalid value {raw:?}: {e}")),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> anyhow::Result<bool> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => bail!("{key} must be true or false, got {v:?}"),
        }
    }

    fn seconds(&self, key: &str, default: i64) -> anyhow::Result<Duration> {
        let secs: i64 = self.parse(key, default)?;
        if secs <= 0 {
            bail!("{key} must be a positive number of seconds");
        }
        Ok(Duration::seconds(secs))
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from a fixed set of variables
    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> anyhow::Result<Self> {
        let vars = Vars(lookup);

        let environment: Environment = vars.parse("APP_ENV", Environment::Development)?;

        let port = match vars.get("API_PORT").or_else(|| vars.get("PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("API_PORT has an invalid value {raw:?}"))?,
            None => 8080,
        };

        let frontend_url = vars
            .get("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origins = match vars.get("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![frontend_url.clone()],
        };

        let log_format = match vars.get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT must be pretty or json, got {other:?}"),
        };

        let api = ApiConfig {
            host: vars.get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            environment,
            frontend_url,
            cors_origins,
            trust_proxy: vars.flag("TRUST_PROXY", true)?,
            log_format,
        };

        let database = DatabaseConfig {
            url: vars.required("DATABASE_URL")?,
            max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10)?,
            use_transactions: vars.flag("USE_TRANSACTIONS", true)?,
        };

        let jwt = JwtConfig {
            secret: vars.required("JWT_SECRET")?,
            refresh_secret: vars.required("JWT_REFRESH_SECRET")?,
            expires_in: vars.seconds("JWT_EXPIRES_IN", 900)?,
            refresh_expires_in: vars.seconds("JWT_REFRESH_EXPIRES_IN", 604_800)?,
            remember_me_expires_in: vars.seconds("JWT_REMEMBER_ME_EXPIRES_IN", 2_592_000)?,
        };

        if jwt.secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }
        if jwt.refresh_secret.len() < 32 {
            bail!("JWT_REFRESH_SECRET must be at least 32 characters long");
        }
        if jwt.secret == jwt.refresh_secret {
            bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let defaults = HashCost::default();
        let password = HashCost {
            memory_kib: vars.parse("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: vars.parse("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: vars.parse("PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let mail = MailConfig {
            from: vars
                .get("MAIL_FROM")
                .unwrap_or_else(|| "no-reply@devhelp.app".to_string()),
            api_url: vars.get("MAIL_API_URL"),
            api_key: vars.get("MAIL_API_KEY"),
        };

        let super_admin = match (vars.get("SUPER_ADMIN_EMAIL"), vars.get("SUPER_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SuperAdminConfig { email, password }),
            (None, None) => None,
            _ => bail!("SUPER_ADMIN_EMAIL and SUPER_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            api,
            database,
            jwt,
            password,
            mail,
            super_admin,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether cookies get the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.api.environment.is_production()
    }
}
